use std::{panic::AssertUnwindSafe, time::Duration};

use chrono::Local;
use futures_util::FutureExt;

use crate::collectors::{SignalSource, collect_signals};
use crate::health::{TransitionDetector, classify, types::HealthSample, types::HealthState};
use crate::journal::{Journal, JournalError, MonitorEvent, Sweeper};

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),
    #[error("Iteration panicked: {0}")]
    Panicked(String),
}

/// The sampling loop: sweep, collect, classify, detect, persist, sleep.
pub struct Monitor<S> {
    source: S,
    journal: Journal,
    sweeper: Sweeper,
    detector: TransitionDetector,
    interval: Duration,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Context for a `monitor_error` record: the panic payload, or the
/// `source()` chain of the error.
fn error_stack(err: &MonitorError) -> Option<String> {
    match err {
        MonitorError::Panicked(payload) => Some(format!("panicked with: {payload}")),
        other => error_chain(other),
    }
}

/// The `source()` chain of `err`, one cause per line.
fn error_chain(err: &dyn std::error::Error) -> Option<String> {
    let mut causes = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        causes.push(format!("caused by: {cause}"));
        source = cause.source();
    }
    (!causes.is_empty()).then(|| causes.join("\n"))
}

impl<S: SignalSource> Monitor<S> {
    pub fn new(source: S, journal: Journal, sweeper: Sweeper, interval: Duration) -> Self {
        Self {
            source,
            journal,
            sweeper,
            detector: TransitionDetector::new(),
            interval,
        }
    }

    /// Records `monitor_start`. Called once before the first iteration.
    pub async fn start(&self, message: impl Into<String>) {
        let message = message.into();
        log::info!("{message}");
        if let Err(e) = self.journal.append_event(&MonitorEvent::start(message)).await {
            log::error!("Unable to record monitor start: {e}");
        }
    }

    /// One iteration, without any error isolation.
    pub async fn iterate(&mut self) -> Result<HealthSample, MonitorError> {
        let started = std::time::Instant::now();
        let report = self
            .sweeper
            .sweep(&self.journal, Local::now().date_naive())
            .await;
        if !report.deleted.is_empty() || report.trimmed {
            log::debug!(
                "Sweep removed {} daily files, events trimmed: {}",
                report.deleted.len(),
                report.trimmed
            );
        }

        let signals = collect_signals(&self.source).await;
        let state = classify(&signals.service, &signals.probe, &signals.network);
        let sample = HealthSample::new(Local::now(), state, signals);

        if let Some(transition) = self.detector.observe(&sample) {
            match transition.to {
                HealthState::Healthy => log::info!(
                    "State changed {} -> {}: {}",
                    transition.from,
                    transition.to,
                    transition.reason
                ),
                HealthState::Degraded | HealthState::Zombie => log::warn!(
                    "State changed {} -> {}: {}",
                    transition.from,
                    transition.to,
                    transition.reason
                ),
            }
            self.journal.append_event(&transition.into()).await?;
        }
        self.journal.append_sample(&sample).await?;

        log::debug!(
            "Sampled {} in {:?} (probe {}ms)",
            sample.state,
            started.elapsed(),
            sample.probe.duration_ms
        );
        Ok(sample)
    }

    /// Runs one iteration and turns any error or panic into a
    /// `monitor_error` event. Returns the sample when the iteration succeeded.
    pub async fn run_once(&mut self) -> Option<HealthSample> {
        let outcome = match AssertUnwindSafe(self.iterate()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => Err(MonitorError::Panicked(panic_message(payload.as_ref()))),
        };
        match outcome {
            Ok(sample) => Some(sample),
            Err(e) => {
                log::error!("Iteration failed: {e}");
                let event = MonitorEvent::error(e.to_string(), error_stack(&e));
                if let Err(e) = self.journal.append_event(&event).await {
                    log::error!("Unable to record iteration failure: {e}");
                }
                None
            }
        }
    }

    /// Samples forever. Only an external kill stops it.
    pub async fn run(mut self) {
        loop {
            self.run_once().await;
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::CollectorError;
    use crate::health::types::{
        ADAPTER_UP, DistroState, NetworkAdapterStatus, ProbeResult, ResourceUsageEntry,
        SERVICE_RUNNING, ServiceStatus,
    };
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::num::NonZeroUsize;
    use std::sync::Mutex;

    /// Replays one scripted state per iteration. `None` makes the
    /// iteration panic.
    struct ScriptedSource {
        script: Mutex<VecDeque<Option<HealthState>>>,
        current: Mutex<HealthState>,
    }

    impl ScriptedSource {
        fn new(script: impl IntoIterator<Item = Option<HealthState>>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                current: Mutex::new(HealthState::Healthy),
            }
        }

        fn current(&self) -> HealthState {
            *self.current.lock().unwrap()
        }
    }

    #[async_trait]
    impl SignalSource for ScriptedSource {
        fn service_name(&self) -> &str {
            "LxssManager"
        }

        async fn service_status(&self) -> Result<ServiceStatus, CollectorError> {
            let next = self.script.lock().unwrap().pop_front().flatten();
            let Some(state) = next else {
                panic!("scripted failure");
            };
            *self.current.lock().unwrap() = state;
            let status = match state {
                HealthState::Zombie => "Stopped",
                _ => SERVICE_RUNNING,
            };
            Ok(ServiceStatus {
                name: "LxssManager".to_string(),
                status: status.to_string(),
                start_type: "Manual".to_string(),
                error: None,
            })
        }

        async fn distros(&self) -> Result<Vec<DistroState>, CollectorError> {
            Ok(vec![DistroState {
                name: "Ubuntu".to_string(),
                state: "Running".to_string(),
                version: 2,
                is_default: true,
            }])
        }

        async fn probe(&self) -> ProbeResult {
            match self.current() {
                HealthState::Healthy => ProbeResult {
                    success: true,
                    duration_ms: 90,
                    output: "ok".to_string(),
                    error: String::new(),
                    timed_out: false,
                },
                _ => ProbeResult::failed(250, "Exited with code 1"),
            }
        }

        async fn resource_usage(&self) -> Result<Vec<ResourceUsageEntry>, CollectorError> {
            Ok(vec![ResourceUsageEntry::new("vmmemWSL", 4120, 1 << 30)])
        }

        async fn network_adapter(&self) -> Result<NetworkAdapterStatus, CollectorError> {
            Ok(NetworkAdapterStatus {
                name: "vEthernet (WSL)".to_string(),
                status: ADAPTER_UP.to_string(),
                link_speed: "10 Gbps".to_string(),
                mac_address: "00-15-5D-00-00-01".to_string(),
                error: None,
            })
        }
    }

    async fn monitor(
        dir: &std::path::Path,
        script: impl IntoIterator<Item = Option<HealthState>>,
    ) -> Monitor<ScriptedSource> {
        let journal = Journal::open(dir).await.unwrap();
        Monitor::new(
            ScriptedSource::new(script),
            journal,
            Sweeper::new(7, u64::MAX, NonZeroUsize::new(1000).unwrap()),
            Duration::from_millis(1),
        )
    }

    fn read_events(journal: &Journal) -> Vec<MonitorEvent> {
        std::fs::read_to_string(journal.events_path())
            .unwrap_or_default()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_transitions_are_logged_once() {
        use HealthState::*;
        let dir = tempfile::tempdir().unwrap();
        let script = [Healthy, Healthy, Zombie, Zombie, Degraded].map(Some);
        let mut monitor = monitor(dir.path(), script).await;

        monitor.start("started").await;
        let mut states = Vec::new();
        for _ in 0..5 {
            states.push(monitor.run_once().await.unwrap().state);
        }
        assert_eq!(states, vec![Healthy, Healthy, Zombie, Zombie, Degraded]);

        let events = read_events(&monitor.journal);
        let kinds: Vec<&str> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(
            kinds,
            vec!["monitor_start", "state_transition", "state_transition"]
        );
        match &events[1] {
            MonitorEvent::StateTransition {
                from, to, reason, ..
            } => {
                assert_eq!((*from, *to), (Healthy, Zombie));
                assert_eq!(reason, "Service LxssManager is Stopped");
            }
            other => panic!("unexpected event {other:?}"),
        }
        match &events[2] {
            MonitorEvent::StateTransition {
                from,
                to,
                reason,
                probe_ms,
                ..
            } => {
                assert_eq!((*from, *to), (Zombie, Degraded));
                assert_eq!(reason, "Probe failed: Exited with code 1");
                assert_eq!(*probe_ms, 250);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_samples_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = monitor(dir.path(), [Some(HealthState::Healthy)]).await;
        let sample = monitor.run_once().await.unwrap();

        let content =
            std::fs::read_to_string(monitor.journal.sample_path(sample.ts.date_naive())).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 1);
        let decoded: HealthSample = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(decoded, sample);
        assert_eq!(decoded.vmmem.entries()[0].working_set_mb, 1024.0);
        // The first sample never produces a transition
        assert!(read_events(&monitor.journal).is_empty());
    }

    #[tokio::test]
    async fn test_panicking_iteration_is_isolated() {
        use HealthState::*;
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = monitor(dir.path(), [Some(Healthy), None, Some(Zombie)]).await;

        assert!(monitor.run_once().await.is_some());
        assert!(monitor.run_once().await.is_none());
        assert_eq!(monitor.run_once().await.unwrap().state, Zombie);

        let events = read_events(&monitor.journal);
        let kinds: Vec<&str> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(kinds, vec!["monitor_error", "state_transition"]);
        match &events[0] {
            MonitorEvent::MonitorError { message, stack, .. } => {
                assert_eq!(message, "Iteration panicked: scripted failure");
                assert_eq!(stack.as_deref(), Some("panicked with: scripted failure"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_removed_log_directory_is_recreated() {
        use HealthState::*;
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let mut monitor = monitor(&logs, [Healthy, Healthy, Zombie].map(Some)).await;

        assert!(monitor.run_once().await.is_some());
        std::fs::remove_dir_all(&logs).unwrap();
        let sample = monitor.run_once().await.unwrap();
        assert!(logs.exists());
        assert!(monitor.journal.sample_path(sample.ts.date_naive()).exists());

        assert_eq!(monitor.run_once().await.unwrap().state, Zombie);
        let events = read_events(&monitor.journal);
        let kinds: Vec<&str> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(kinds, vec!["state_transition"]);
    }

    #[tokio::test]
    async fn test_journal_failure_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = monitor(dir.path(), [Some(HealthState::Healthy)]).await;
        // A directory where today's sample file should be makes the append fail.
        let today = Local::now().date_naive();
        std::fs::create_dir(monitor.journal.sample_path(today)).unwrap();

        assert!(monitor.run_once().await.is_none());

        let events = read_events(&monitor.journal);
        assert_eq!(events.len(), 1);
        match &events[0] {
            MonitorEvent::MonitorError { message, stack, .. } => {
                assert!(message.starts_with("Journal error: IO error"), "{message}");
                assert!(stack.as_deref().unwrap_or_default().contains("caused by"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
