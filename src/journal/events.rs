use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::health::types::HealthState;

/// One line of the events file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum MonitorEvent {
    StateTransition {
        timestamp: DateTime<Local>,
        from: HealthState,
        to: HealthState,
        reason: String,
        probe_ms: u64,
        probe_timed_out: bool,
        service_status: String,
        adapter_status: String,
    },
    MonitorStart {
        timestamp: DateTime<Local>,
        message: String,
    },
    MonitorError {
        timestamp: DateTime<Local>,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },
}

impl MonitorEvent {
    pub fn start(message: impl Into<String>) -> Self {
        MonitorEvent::MonitorStart {
            timestamp: Local::now(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>, stack: Option<String>) -> Self {
        MonitorEvent::MonitorError {
            timestamp: Local::now(),
            message: message.into(),
            stack,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            MonitorEvent::StateTransition { .. } => "state_transition",
            MonitorEvent::MonitorStart { .. } => "monitor_start",
            MonitorEvent::MonitorError { .. } => "monitor_error",
        }
    }
}
