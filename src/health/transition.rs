use chrono::{DateTime, Local};

use super::types::{HealthSample, HealthState, NetworkAdapterStatus, ProbeResult, ServiceStatus};
use crate::journal::events::MonitorEvent;

/// Remembers the last classified state between iterations.
///
/// Starts out unknown, so the very first sample never produces a
/// transition.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransitionDetector {
    previous: Option<HealthState>,
}

/// A change of state between two consecutive samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub timestamp: DateTime<Local>,
    pub from: HealthState,
    pub to: HealthState,
    pub reason: String,
    pub probe_ms: u64,
    pub probe_timed_out: bool,
    pub service_status: String,
    pub adapter_status: String,
}

impl From<Transition> for MonitorEvent {
    fn from(t: Transition) -> Self {
        MonitorEvent::StateTransition {
            timestamp: t.timestamp,
            from: t.from,
            to: t.to,
            reason: t.reason,
            probe_ms: t.probe_ms,
            probe_timed_out: t.probe_timed_out,
            service_status: t.service_status,
            adapter_status: t.adapter_status,
        }
    }
}

/// Explains the current sample. Walks its own precedence list, independent
/// of `classify`: a slow but successful probe is not a listed cause, so a
/// move into `degraded` for that reason reads "Metrics returned to normal".
pub fn transition_reason(
    service: &ServiceStatus,
    probe: &ProbeResult,
    network: &NetworkAdapterStatus,
) -> String {
    if probe.timed_out {
        format!("Probe timed out after {}ms", probe.duration_ms)
    } else if !service.is_running() {
        format!("Service {} is {}", service.name, service.status)
    } else if !probe.success {
        if probe.error.is_empty() {
            "Probe failed".to_string()
        } else {
            format!("Probe failed: {}", probe.error)
        }
    } else if !network.is_up() {
        format!("Network adapter {} is {}", network.name, network.status)
    } else {
        "Metrics returned to normal".to_string()
    }
}

impl TransitionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compares `sample` with the previously seen state and records it as the
    /// new previous state. Returns the transition, if any.
    pub fn observe(&mut self, sample: &HealthSample) -> Option<Transition> {
        let previous = self.previous.replace(sample.state)?;
        if previous == sample.state {
            return None;
        }
        Some(Transition {
            timestamp: sample.ts,
            from: previous,
            to: sample.state,
            reason: transition_reason(&sample.service, &sample.probe, &sample.network),
            probe_ms: sample.probe.duration_ms,
            probe_timed_out: sample.probe.timed_out,
            service_status: sample.service.status.clone(),
            adapter_status: sample.network.status.clone(),
        })
    }
}
