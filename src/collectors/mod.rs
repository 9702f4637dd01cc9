//! Read-only queries feeding the classifier.
//!
//! Each collector returns `Result<_, CollectorError>`. [`collect_signals`]
//! is the boundary where failures turn into error-bearing records, so a
//! broken query shows up in the sample instead of aborting the iteration.

use std::{process::ExitStatus, time::Duration};

use async_trait::async_trait;
use tokio::process::Command;

use crate::health::types::{
    DistroState, Listing, NetworkAdapterStatus, ProbeResult, ResourceUsageEntry, ServiceStatus,
    Signals,
};
use crate::probe::{Bounded, BoundedOutput, run_bounded};

pub mod distros;
pub mod network;
pub mod resources;
pub mod service;
pub mod system;

pub use system::SystemSource;

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{program} did not finish within {timeout:?}")]
    Timeout {
        program: &'static str,
        timeout: Duration,
    },
    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        program: &'static str,
        status: ExitStatus,
        stderr: String,
    },
    #[error("Unexpected {program} output: {detail}")]
    Parse {
        program: &'static str,
        detail: String,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid adapter pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("Collector task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// The signals the monitor fuses. Implemented for the real host by
/// [`SystemSource`].
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Name recorded in the service sentinel when the query fails.
    fn service_name(&self) -> &str;
    async fn service_status(&self) -> Result<ServiceStatus, CollectorError>;
    async fn distros(&self) -> Result<Vec<DistroState>, CollectorError>;
    async fn probe(&self) -> ProbeResult;
    async fn resource_usage(&self) -> Result<Vec<ResourceUsageEntry>, CollectorError>;
    async fn network_adapter(&self) -> Result<NetworkAdapterStatus, CollectorError>;
}

/// Queries every collector one after the other.
pub async fn collect_signals<S>(source: &S) -> Signals
where
    S: SignalSource + ?Sized,
{
    let service = source.service_status().await.unwrap_or_else(|e| {
        log::warn!("Service query failed: {e}");
        ServiceStatus::failed(source.service_name(), e)
    });
    let distros = match source.distros().await {
        Ok(distros) => Listing::Entries(distros),
        Err(e) => {
            log::warn!("Distro listing failed: {e}");
            Listing::failed(e)
        }
    };
    let probe = source.probe().await;
    let vmmem = match source.resource_usage().await {
        Ok(entries) => Listing::Entries(entries),
        Err(e) => {
            log::warn!("Process query failed: {e}");
            Listing::failed(e)
        }
    };
    let network = source.network_adapter().await.unwrap_or_else(|e| {
        log::warn!("Network adapter query failed: {e}");
        NetworkAdapterStatus::failed(e)
    });

    Signals {
        service,
        distros,
        probe,
        vmmem,
        network,
    }
}

/// Runs a secondary query command under `timeout`, whatever its exit code.
pub(crate) async fn run_query(
    program: &'static str,
    args: &[&str],
    timeout: Duration,
) -> Result<BoundedOutput, CollectorError> {
    let mut command = Command::new(program);
    command.args(args);
    match run_bounded(command, timeout).await? {
        Bounded::Exited(output) => Ok(output),
        Bounded::TimedOut => Err(CollectorError::Timeout { program, timeout }),
    }
}

pub(crate) fn require_success(
    program: &'static str,
    output: BoundedOutput,
) -> Result<BoundedOutput, CollectorError> {
    if output.status.success() {
        return Ok(output);
    }
    Err(CollectorError::Exit {
        program,
        status: output.status,
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}
