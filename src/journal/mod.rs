//! JSON-Lines persistence.
//!
//! Health samples go to one file per calendar day (`health-YYYY-MM-DD.jsonl`),
//! lifecycle and transition events to a single `events.jsonl`. Every record is
//! appended with its own open/write/close, so no handle or lock is held
//! between writes and external readers can tail the files at any time.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
};

use crate::health::types::HealthSample;

pub mod events;
pub mod sweeper;

pub use events::MonitorEvent;
pub use sweeper::Sweeper;

pub const EVENTS_FILE: &str = "events.jsonl";
const SAMPLE_PREFIX: &str = "health-";
const SAMPLE_SUFFIX: &str = ".jsonl";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn sample_file_name(date: NaiveDate) -> String {
    format!("{SAMPLE_PREFIX}{}{SAMPLE_SUFFIX}", date.format(DATE_FORMAT))
}

/// The date embedded in a daily sample file name, if `name` is one.
pub fn sample_file_date(name: &str) -> Option<NaiveDate> {
    let date = name.strip_prefix(SAMPLE_PREFIX)?.strip_suffix(SAMPLE_SUFFIX)?;
    NaiveDate::parse_from_str(date, DATE_FORMAT).ok()
}

/// Opens `path` for appending. A log directory removed while the monitor
/// runs is created again.
async fn open_append(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    match options.open(path).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let Some(parent) = path.parent() else {
                return Err(e);
            };
            log::warn!("Log directory {parent:?} is missing, creating it again");
            tokio::fs::create_dir_all(parent).await?;
            options.open(path).await
        }
        res => res,
    }
}

/// Serializes `record` as one compact line and appends it to `path`.
async fn append_line<T: Serialize>(path: &Path, record: &T) -> Result<(), JournalError> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    let mut file = open_append(path).await?;
    file.write_all(&line).await?;
    file.flush().await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Journal {
    dir: PathBuf,
}

impl Journal {
    /// Creates the log directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn events_path(&self) -> PathBuf {
        self.dir.join(EVENTS_FILE)
    }

    pub fn sample_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(sample_file_name(date))
    }

    /// Appends to the file of the day the sample was taken.
    pub async fn append_sample(&self, sample: &HealthSample) -> Result<(), JournalError> {
        append_line(&self.sample_path(sample.ts.date_naive()), sample).await
    }

    pub async fn append_event(&self, event: &MonitorEvent) -> Result<(), JournalError> {
        append_line(&self.events_path(), event).await?;
        log::debug!("Recorded {} event", event.event_type());
        Ok(())
    }
}
