use std::{path::PathBuf, sync::OnceLock};

use clap::Parser;

/// Watches the WSL subsystem and records when it turns into a zombie.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to the config file.
    #[arg(short, long, default_value = "wslwatch.toml")]
    pub config: PathBuf,
    /// Directory where the health and event logs are written.
    /// Overrides `log_dir` from the config file.
    #[arg(short, long)]
    pub log_dir: Option<PathBuf>,
    /// Take a single sample and exit.
    #[arg(long)]
    pub once: bool,
}

static ARGS: OnceLock<Args> = OnceLock::new();

pub fn get_cli_args() -> &'static Args {
    ARGS.get_or_init(Args::parse)
}
