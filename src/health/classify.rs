use super::types::{HealthState, NetworkAdapterStatus, ProbeResult, ServiceStatus};

/// A probe slower than this is treated as degraded even when it succeeds.
pub const SLOW_PROBE_MS: u64 = 3000;

/// Fuses the signals into a single state. The first rule that matches wins,
/// so the order of the checks below is part of the contract.
pub fn classify(
    service: &ServiceStatus,
    probe: &ProbeResult,
    network: &NetworkAdapterStatus,
) -> HealthState {
    if probe.timed_out {
        return HealthState::Zombie;
    }
    if !service.is_running() {
        return HealthState::Zombie;
    }
    if !probe.success {
        return HealthState::Degraded;
    }
    if probe.duration_ms > SLOW_PROBE_MS {
        return HealthState::Degraded;
    }
    if !network.is_up() {
        return HealthState::Degraded;
    }
    HealthState::Healthy
}
