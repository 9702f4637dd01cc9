use std::time::Duration;

use async_trait::async_trait;

use super::{CollectorError, SignalSource, distros, network, resources, service};
use crate::config::MonitorConfig;
use crate::health::types::{
    DistroState, NetworkAdapterStatus, ProbeResult, ResourceUsageEntry, ServiceStatus,
};
use crate::probe::{probe_command, run_probe};

/// Collects the signals from the local Windows host.
#[derive(Debug, Clone)]
pub struct SystemSource {
    service_name: String,
    probe_target: String,
    process_prefix: String,
    adapter_pattern: String,
    probe_timeout: Duration,
    query_timeout: Duration,
}

impl SystemSource {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            service_name: config.service_name.clone(),
            probe_target: config.probe_target.clone(),
            process_prefix: config.process_prefix.clone(),
            adapter_pattern: config.adapter_pattern.clone(),
            probe_timeout: config.probe_timeout(),
            query_timeout: config.collector_timeout(),
        }
    }
}

#[async_trait]
impl SignalSource for SystemSource {
    fn service_name(&self) -> &str {
        &self.service_name
    }

    async fn service_status(&self) -> Result<ServiceStatus, CollectorError> {
        service::query_service(&self.service_name, self.query_timeout).await
    }

    async fn distros(&self) -> Result<Vec<DistroState>, CollectorError> {
        distros::list_distros(self.query_timeout).await
    }

    async fn probe(&self) -> ProbeResult {
        run_probe(probe_command(&self.probe_target), self.probe_timeout).await
    }

    async fn resource_usage(&self) -> Result<Vec<ResourceUsageEntry>, CollectorError> {
        resources::resource_usage(&self.process_prefix).await
    }

    async fn network_adapter(&self) -> Result<NetworkAdapterStatus, CollectorError> {
        network::query_adapter(&self.adapter_pattern, self.query_timeout).await
    }
}
