use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use super::{CollectorError, require_success, run_query};
use crate::health::types::NetworkAdapterStatus;

const POWERSHELL: &str = "powershell.exe";
const GET_ADAPTERS: &str =
    "Get-NetAdapter | Select-Object Name,Status,LinkSpeed,MacAddress | ConvertTo-Json -Compress";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawAdapter {
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub link_speed: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
}

/// `ConvertTo-Json` emits a bare object when there is a single adapter.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<RawAdapter>),
    One(RawAdapter),
}

/// Translates a `*`/`?` glob into an anchored, case-insensitive regex.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut expr = String::from("(?i)^");
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            c => expr.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    expr.push('$');
    Regex::new(&expr)
}

pub fn parse_adapters(json: &str) -> Result<Vec<RawAdapter>, serde_json::Error> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(match serde_json::from_str(json)? {
        OneOrMany::Many(adapters) => adapters,
        OneOrMany::One(adapter) => vec![adapter],
    })
}

/// First adapter whose name matches, or the `NOT_FOUND` sentinel.
pub fn select_adapter(adapters: Vec<RawAdapter>, pattern: &Regex) -> NetworkAdapterStatus {
    adapters
        .into_iter()
        .find(|adapter| pattern.is_match(&adapter.name))
        .map(|adapter| NetworkAdapterStatus {
            name: adapter.name,
            status: adapter.status.unwrap_or_default(),
            link_speed: adapter.link_speed.unwrap_or_default(),
            mac_address: adapter.mac_address.unwrap_or_default(),
            error: None,
        })
        .unwrap_or_else(NetworkAdapterStatus::not_found)
}

pub async fn query_adapter(
    pattern: &str,
    timeout: Duration,
) -> Result<NetworkAdapterStatus, CollectorError> {
    let pattern = glob_to_regex(pattern)?;
    let output = run_query(
        POWERSHELL,
        &["-NoProfile", "-NonInteractive", "-Command", GET_ADAPTERS],
        timeout,
    )
    .await?;
    let output = require_success(POWERSHELL, output)?;
    let adapters = parse_adapters(&String::from_utf8_lossy(&output.stdout))?;
    Ok(select_adapter(adapters, &pattern))
}
