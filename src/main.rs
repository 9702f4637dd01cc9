use std::process::ExitCode;

use collectors::SystemSource;
use config::MonitorConfig;
use journal::{Journal, Sweeper};
use monitor::Monitor;

mod cli;
mod collectors;
mod config;
mod health;
mod journal;
mod monitor;
mod probe;

fn startup_message(config: &MonitorConfig, journal: &Journal) -> String {
    format!(
        "wslwatch {} started: sampling every {}s, probing {:?} with a {}s timeout, logs in {:?}",
        env!("CARGO_PKG_VERSION"),
        config.interval,
        config.probe_target,
        config.probe_timeout,
        journal.dir()
    )
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize the logger
    env_logger::init();

    let config = match MonitorConfig::try_init() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Unable to read config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let journal = match config.resolve_log_dir() {
        Ok(dir) => match Journal::open(&dir).await {
            Ok(journal) => journal,
            Err(e) => {
                log::error!("Unable to create log directory {dir:?}: {e}");
                return ExitCode::FAILURE;
            }
        },
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let mut monitor = Monitor::new(
        SystemSource::new(&config),
        journal.clone(),
        Sweeper::from_config(&config),
        config.interval(),
    );
    monitor.start(startup_message(&config, &journal)).await;

    if cli::get_cli_args().once {
        return match monitor.run_once().await {
            Some(sample) => {
                println!("{}", sample.state);
                ExitCode::SUCCESS
            }
            None => ExitCode::FAILURE,
        };
    }

    monitor.run().await;
    ExitCode::SUCCESS
}
