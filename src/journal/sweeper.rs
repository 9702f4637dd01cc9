use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use chrono::{Days, NaiveDate};

use super::{Journal, JournalError, sample_file_date};
use crate::config::MonitorConfig;

/// Keeps the log directory bounded: expired daily files are deleted and an
/// oversized events file is cut down to its most recent lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sweeper {
    retention_days: u32,
    events_max_bytes: u64,
    events_keep_lines: NonZeroUsize,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: Vec<PathBuf>,
    pub trimmed: bool,
}

impl Sweeper {
    pub fn new(
        retention_days: u32,
        events_max_bytes: u64,
        events_keep_lines: NonZeroUsize,
    ) -> Self {
        Self {
            retention_days,
            events_max_bytes,
            events_keep_lines,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(
            config.retention_days,
            config.events_max_bytes,
            config.events_keep_lines,
        )
    }

    /// Runs both passes. Failures are logged and never propagated.
    pub async fn sweep(&self, journal: &Journal, today: NaiveDate) -> SweepReport {
        let deleted = match self.delete_expired(journal.dir(), today).await {
            Ok(deleted) => deleted,
            Err(e) => {
                log::warn!("Unable to scan {:?} for expired logs: {e}", journal.dir());
                Vec::new()
            }
        };
        let trimmed = match self.trim_events(&journal.events_path()).await {
            Ok(trimmed) => trimmed,
            Err(e) => {
                log::warn!("Unable to trim the events file: {e}");
                false
            }
        };
        SweepReport { deleted, trimmed }
    }

    /// Deletes daily sample files dated strictly before
    /// `today - retention_days`.
    async fn delete_expired(
        &self,
        dir: &Path,
        today: NaiveDate,
    ) -> Result<Vec<PathBuf>, JournalError> {
        let Some(cutoff) = today.checked_sub_days(Days::new(self.retention_days.into())) else {
            return Ok(Vec::new());
        };

        let mut deleted = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let date = match entry.file_name().to_str().and_then(sample_file_date) {
                Some(date) => date,
                None => continue,
            };
            if date >= cutoff {
                continue;
            }
            let path = entry.path();
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    log::info!("Deleted expired log {path:?}");
                    deleted.push(path);
                }
                Err(e) => log::warn!("Unable to delete expired log {path:?}: {e}"),
            }
        }
        deleted.sort();
        Ok(deleted)
    }

    /// Cuts the events file down to its last `events_keep_lines` complete
    /// lines once it exceeds `events_max_bytes`. If those lines still exceed
    /// the ceiling, older ones are dropped until they fit (the newest line is
    /// always kept). The file is replaced through a rename, so readers see
    /// either the old or the new content.
    pub async fn trim_events(&self, path: &Path) -> Result<bool, JournalError> {
        let size = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if size <= self.events_max_bytes {
            return Ok(false);
        }

        let raw = tokio::fs::read(path).await?;
        let content = String::from_utf8_lossy(&raw);
        // A line without its newline is a write that never finished.
        let complete = match content.rfind('\n') {
            Some(end) => &content[..end],
            None => "",
        };
        let lines: Vec<&str> = complete.lines().filter(|l| !l.trim().is_empty()).collect();
        let mut kept = &lines[lines.len().saturating_sub(self.events_keep_lines.get())..];
        let mut kept_bytes: u64 = kept.iter().map(|l| l.len() as u64 + 1).sum();
        while kept.len() > 1 && kept_bytes > self.events_max_bytes {
            kept_bytes -= kept[0].len() as u64 + 1;
            kept = &kept[1..];
        }

        let mut trimmed = String::with_capacity(kept_bytes as usize);
        for line in kept {
            trimmed.push_str(line);
            trimmed.push('\n');
        }

        let tmp = path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, trimmed.as_bytes()).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        log::info!(
            "Trimmed {path:?} from {size} to {kept_bytes} bytes ({} lines kept)",
            kept.len()
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{EVENTS_FILE, MonitorEvent, sample_file_name};

    fn keep(lines: usize) -> NonZeroUsize {
        NonZeroUsize::new(lines).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, "{}\n").unwrap();
        path
    }

    #[tokio::test]
    async fn test_retention_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::open(dir.path()).await.unwrap();
        let sweeper = Sweeper::new(7, u64::MAX, keep(10));
        let day = |n: u64| sample_file_name(today().checked_sub_days(Days::new(n)).unwrap());

        let too_old = touch(dir.path(), &day(8));
        let way_too_old = touch(dir.path(), &day(400));
        let at_limit = touch(dir.path(), &day(7));
        let recent = touch(dir.path(), &day(6));
        let current = touch(dir.path(), &day(0));
        let unrelated = touch(dir.path(), "health-notes.txt");
        let events = touch(dir.path(), EVENTS_FILE);

        let report = sweeper.sweep(&journal, today()).await;

        let mut expected = vec![too_old.clone(), way_too_old.clone()];
        expected.sort();
        assert_eq!(report.deleted, expected);
        assert!(!report.trimmed);
        assert!(!too_old.exists());
        assert!(!way_too_old.exists());
        for kept in [at_limit, recent, current, unrelated, events] {
            assert!(kept.exists(), "{kept:?} should be kept");
        }
    }

    #[tokio::test]
    async fn test_missing_directory_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::open(dir.path().join("logs")).await.unwrap();
        std::fs::remove_dir(journal.dir()).unwrap();

        let report = Sweeper::new(7, 1024, keep(10)).sweep(&journal, today()).await;
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn test_trim_keeps_recent_complete_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(EVENTS_FILE);

        let mut content = String::new();
        for i in 0..100 {
            let event = MonitorEvent::error(format!("failure {i}"), None);
            content.push_str(&serde_json::to_string(&event).unwrap());
            content.push('\n');
        }
        std::fs::write(&path, &content).unwrap();
        let before = content.len() as u64;

        let sweeper = Sweeper::new(7, before / 2, keep(10));
        assert!(sweeper.trim_events(&path).await.unwrap());

        let after = std::fs::read_to_string(&path).unwrap();
        assert!((after.len() as u64) < before);
        let events: Vec<MonitorEvent> = after
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(events.len(), 10);
        for (event, i) in events.iter().zip(90..) {
            match event {
                MonitorEvent::MonitorError { message, .. } => {
                    assert_eq!(message, &format!("failure {i}"))
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert!(!dir.path().join("events.jsonl.tmp").exists());
    }

    #[tokio::test]
    async fn test_trim_drops_torn_tail_and_respects_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(EVENTS_FILE);
        let line = format!("{{\"type\":\"monitor_start\",\"message\":\"{}\"}}", "x".repeat(80));
        let mut content = format!("{line}\n").repeat(20);
        content.push_str("{\"type\":\"monitor_err");
        std::fs::write(&path, &content).unwrap();

        // Keeping 10 lines would still exceed 300 bytes.
        let sweeper = Sweeper::new(7, 300, keep(10));
        assert!(sweeper.trim_events(&path).await.unwrap());

        let after = std::fs::read_to_string(&path).unwrap();
        assert!(after.len() <= 300);
        assert!(after.ends_with("}\n"));
        assert!(after.lines().all(|l| l == line));
        assert!(after.lines().count() >= 1);
    }

    #[tokio::test]
    async fn test_trim_never_empties_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(EVENTS_FILE);
        std::fs::write(&path, "{\"n\":1}\n{\"n\":2}\n").unwrap();

        let sweeper = Sweeper::new(7, 4, keep(1));
        assert!(sweeper.trim_events(&path).await.unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"n\":2}\n");
    }

    #[tokio::test]
    async fn test_small_or_missing_file_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(EVENTS_FILE);
        let sweeper = Sweeper::new(7, 1024, keep(10));
        assert!(!sweeper.trim_events(&path).await.unwrap());

        std::fs::write(&path, "{\"type\":\"monitor_start\"}\n").unwrap();
        assert!(!sweeper.trim_events(&path).await.unwrap());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "{\"type\":\"monitor_start\"}\n"
        );
    }
}
