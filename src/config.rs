use std::{
    num::{NonZeroU64, NonZeroUsize},
    path::PathBuf,
    time::Duration,
};

const APP_DIR: &str = "wslwatch";

/// Static configuration of the monitor. Read once at startup.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct MonitorConfig {
    /// Seconds between two samples.
    #[serde(default = "default_interval")]
    pub interval: NonZeroU64,
    /// Hard timeout in seconds for the connectivity probe.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: NonZeroU64,
    /// Timeout in seconds for every secondary query (service, distros, adapter).
    #[serde(default = "default_collector_timeout")]
    pub collector_timeout: NonZeroU64,
    /// Daily health files older than this many days are deleted.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Distribution the probe runs `echo ok` in.
    #[serde(default = "default_probe_target")]
    pub probe_target: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_process_prefix")]
    pub process_prefix: String,
    /// Glob (`*` and `?`) matched against network adapter names.
    #[serde(default = "default_adapter_pattern")]
    pub adapter_pattern: String,
    /// Once the events file grows past this size it is trimmed.
    #[serde(default = "default_events_max_bytes")]
    pub events_max_bytes: u64,
    /// Complete lines the events file keeps after a trim.
    #[serde(default = "default_events_keep_lines")]
    pub events_keep_lines: NonZeroUsize,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_interval() -> NonZeroU64 {
    NonZeroU64::new(30).unwrap_or(NonZeroU64::MIN)
}

fn default_probe_timeout() -> NonZeroU64 {
    NonZeroU64::new(10).unwrap_or(NonZeroU64::MIN)
}

fn default_collector_timeout() -> NonZeroU64 {
    NonZeroU64::new(5).unwrap_or(NonZeroU64::MIN)
}

fn default_retention_days() -> u32 {
    7
}

fn default_probe_target() -> String {
    "Ubuntu".to_string()
}

fn default_service_name() -> String {
    "LxssManager".to_string()
}

fn default_process_prefix() -> String {
    "vmmem".to_string()
}

fn default_adapter_pattern() -> String {
    "vEthernet (WSL*)".to_string()
}

fn default_events_max_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_events_keep_lines() -> NonZeroUsize {
    NonZeroUsize::new(5000).unwrap_or(NonZeroUsize::MIN)
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            probe_timeout: default_probe_timeout(),
            collector_timeout: default_collector_timeout(),
            retention_days: default_retention_days(),
            probe_target: default_probe_target(),
            service_name: default_service_name(),
            process_prefix: default_process_prefix(),
            adapter_pattern: default_adapter_pattern(),
            events_max_bytes: default_events_max_bytes(),
            events_keep_lines: default_events_keep_lines(),
            log_dir: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Unable to determine a per-user data directory, set `log_dir` explicitly")]
    NoLogDir,
}

impl MonitorConfig {
    fn try_init_from_string(val: &str) -> Result<Self, MonitorConfigError> {
        Ok(toml::from_str(val)?)
    }

    /// Loads the config file named on the command line. A missing file
    /// means every setting keeps its default.
    pub fn try_init() -> Result<Self, MonitorConfigError> {
        use std::io::Read;
        let args = crate::cli::get_cli_args();
        let mut config = match std::fs::File::open(&args.config) {
            Ok(mut file) => {
                let mut content = String::new();
                file.read_to_string(&mut content)?;
                Self::try_init_from_string(&content)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config at {:?}, using defaults", args.config);
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(dir) = &args.log_dir {
            config.log_dir = Some(dir.clone());
        }
        Ok(config)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval.get())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout.get())
    }

    pub fn collector_timeout(&self) -> Duration {
        Duration::from_secs(self.collector_timeout.get())
    }

    /// The configured log directory, or `<local data dir>/wslwatch`.
    pub fn resolve_log_dir(&self) -> Result<PathBuf, MonitorConfigError> {
        match &self.log_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_local_dir()
                .map(|dir| dir.join(APP_DIR))
                .ok_or(MonitorConfigError::NoLogDir),
        }
    }
}
