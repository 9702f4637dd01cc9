use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

pub const SERVICE_RUNNING: &str = "Running";
pub const SERVICE_NOT_FOUND: &str = "NotFound";
pub const ADAPTER_UP: &str = "Up";
pub const ADAPTER_NOT_FOUND: &str = "NOT_FOUND";
pub const ADAPTER_MISSING: &str = "Missing";
/// Prefix of the status written by a collector that failed instead of
/// returning data. The failure message follows it.
pub const COLLECTOR_ERROR: &str = "Error";

fn error_status(error: &str) -> String {
    format!("{COLLECTOR_ERROR}: {error}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Zombie,
}

impl AsRef<str> for HealthState {
    fn as_ref(&self) -> &str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Zombie => "zombie",
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub name: String,
    pub status: String,
    pub start_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceStatus {
    pub fn not_found(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: SERVICE_NOT_FOUND.to_string(),
            start_type: String::new(),
            error: None,
        }
    }

    pub fn failed(name: &str, error: impl std::fmt::Display) -> Self {
        let error = error.to_string();
        Self {
            name: name.to_string(),
            status: error_status(&error),
            start_type: String::new(),
            error: Some(error),
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == SERVICE_RUNNING
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistroState {
    pub name: String,
    pub state: String,
    pub version: u32,
    pub is_default: bool,
}

/// Outcome of one bounded connectivity probe.
///
/// `timed_out` always implies `!success`. `duration_ms` is filled in on
/// every path, including failures to start the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub success: bool,
    pub duration_ms: u64,
    pub output: String,
    pub error: String,
    pub timed_out: bool,
}

impl ProbeResult {
    pub fn timed_out(duration_ms: u64, timeout: std::time::Duration) -> Self {
        Self {
            success: false,
            duration_ms,
            output: String::new(),
            error: format!("Probe timed out after {timeout:?}"),
            timed_out: true,
        }
    }

    pub fn failed(duration_ms: u64, error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            duration_ms,
            output: String::new(),
            error: error.to_string(),
            timed_out: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsageEntry {
    pub name: String,
    pub pid: u32,
    /// Working set in MB, rounded to one decimal.
    #[serde(rename = "workingSetMB")]
    pub working_set_mb: f64,
}

impl ResourceUsageEntry {
    pub fn new(name: impl Into<String>, pid: u32, working_set_bytes: u64) -> Self {
        let mb = working_set_bytes as f64 / (1024.0 * 1024.0);
        Self {
            name: name.into(),
            pid,
            working_set_mb: (mb * 10.0).round() / 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAdapterStatus {
    pub name: String,
    pub status: String,
    pub link_speed: String,
    pub mac_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NetworkAdapterStatus {
    pub fn not_found() -> Self {
        Self {
            name: ADAPTER_NOT_FOUND.to_string(),
            status: ADAPTER_MISSING.to_string(),
            link_speed: String::new(),
            mac_address: String::new(),
            error: None,
        }
    }

    pub fn failed(error: impl std::fmt::Display) -> Self {
        let error = error.to_string();
        Self {
            name: ADAPTER_NOT_FOUND.to_string(),
            status: error_status(&error),
            link_speed: String::new(),
            mac_address: String::new(),
            error: Some(error),
        }
    }

    pub fn is_up(&self) -> bool {
        self.status == ADAPTER_UP
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorFailure {
    pub state: String,
    pub error: String,
}

/// A sequence-valued reading: either the entries, or the reason the
/// collector could not produce them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Entries(Vec<T>),
    Failed(CollectorFailure),
}

impl<T> Listing<T> {
    pub fn failed(error: impl std::fmt::Display) -> Self {
        let error = error.to_string();
        Self::Failed(CollectorFailure {
            state: error_status(&error),
            error,
        })
    }

    pub fn entries(&self) -> &[T] {
        match self {
            Self::Entries(entries) => entries,
            Self::Failed(_) => &[],
        }
    }
}

/// Everything collected in one iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct Signals {
    pub service: ServiceStatus,
    pub distros: Listing<DistroState>,
    pub probe: ProbeResult,
    pub vmmem: Listing<ResourceUsageEntry>,
    pub network: NetworkAdapterStatus,
}

/// One line of the daily health file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSample {
    pub ts: DateTime<Local>,
    pub state: HealthState,
    pub service: ServiceStatus,
    pub distros: Listing<DistroState>,
    pub probe: ProbeResult,
    pub vmmem: Listing<ResourceUsageEntry>,
    pub network: NetworkAdapterStatus,
}

impl HealthSample {
    pub fn new(ts: DateTime<Local>, state: HealthState, signals: Signals) -> Self {
        Self {
            ts,
            state,
            service: signals.service,
            distros: signals.distros,
            probe: signals.probe,
            vmmem: signals.vmmem,
            network: signals.network,
        }
    }
}
