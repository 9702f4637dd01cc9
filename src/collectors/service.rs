//! Service state through `sc.exe query` / `sc.exe qc`.

use std::time::Duration;

use super::{CollectorError, require_success, run_query};
use crate::health::types::ServiceStatus;

const SC: &str = "sc.exe";
/// ERROR_SERVICE_DOES_NOT_EXIST
const SERVICE_DOES_NOT_EXIST: i32 = 1060;

/// Value of a `KEY : <code> <NAME> ...` line, e.g. `RUNNING` for
/// `STATE              : 4  RUNNING`.
fn field<'a>(output: &'a str, key: &str) -> Option<&'a str> {
    output.lines().find_map(|line| {
        let (lhs, rhs) = line.split_once(':')?;
        if lhs.trim() != key {
            return None;
        }
        rhs.split_whitespace().nth(1)
    })
}

pub fn parse_state(output: &str) -> Option<String> {
    let state = match field(output, "STATE")? {
        "RUNNING" => "Running",
        "STOPPED" => "Stopped",
        "START_PENDING" => "StartPending",
        "STOP_PENDING" => "StopPending",
        "CONTINUE_PENDING" => "ContinuePending",
        "PAUSE_PENDING" => "PausePending",
        "PAUSED" => "Paused",
        other => other,
    };
    Some(state.to_string())
}

pub fn parse_start_type(output: &str) -> Option<String> {
    let start_type = match field(output, "START_TYPE")? {
        "AUTO_START" => "Automatic",
        "DEMAND_START" => "Manual",
        "DISABLED" => "Disabled",
        "BOOT_START" => "Boot",
        "SYSTEM_START" => "System",
        other => other,
    };
    Some(start_type.to_string())
}

fn does_not_exist(code: Option<i32>, output: &str) -> bool {
    code == Some(SERVICE_DOES_NOT_EXIST) || output.contains("FAILED 1060")
}

pub async fn query_service(name: &str, timeout: Duration) -> Result<ServiceStatus, CollectorError> {
    let output = run_query(SC, &["query", name], timeout).await?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if does_not_exist(output.status.code(), &stdout) {
        return Ok(ServiceStatus::not_found(name));
    }
    require_success(SC, output)?;
    let status = parse_state(&stdout).ok_or_else(|| CollectorError::Parse {
        program: SC,
        detail: "no STATE line".to_string(),
    })?;

    // The start type is secondary; a failure here keeps the state.
    let start_type = match run_query(SC, &["qc", name], timeout).await {
        Ok(output) => parse_start_type(&String::from_utf8_lossy(&output.stdout)),
        Err(e) => {
            log::debug!("Unable to read start type of {name}: {e}");
            None
        }
    };

    Ok(ServiceStatus {
        name: name.to_string(),
        status,
        start_type: start_type.unwrap_or_default(),
        error: None,
    })
}
