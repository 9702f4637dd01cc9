use sysinfo::{ProcessesToUpdate, System};

use super::CollectorError;
use crate::health::types::ResourceUsageEntry;

/// Keeps the processes whose name starts with `prefix` (case-insensitive),
/// ordered by pid.
fn select<I>(processes: I, prefix: &str) -> Vec<ResourceUsageEntry>
where
    I: IntoIterator<Item = (u32, String, u64)>,
{
    let prefix = prefix.to_lowercase();
    let mut entries: Vec<ResourceUsageEntry> = processes
        .into_iter()
        .filter(|(_, name, _)| name.to_lowercase().starts_with(&prefix))
        .map(|(pid, name, memory)| {
            let name = name.strip_suffix(".exe").unwrap_or(&name).to_string();
            ResourceUsageEntry::new(name, pid, memory)
        })
        .collect();
    entries.sort_by_key(|entry| entry.pid);
    entries
}

/// Working set of the VM memory processes (`vmmem`, `vmmemWSL`).
pub async fn resource_usage(prefix: &str) -> Result<Vec<ResourceUsageEntry>, CollectorError> {
    let prefix = prefix.to_string();
    let entries = tokio::task::spawn_blocking(move || {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);
        let processes = system.processes().iter().map(|(pid, process)| {
            (
                pid.as_u32(),
                process.name().to_string_lossy().into_owned(),
                process.memory(),
            )
        });
        select(processes, &prefix)
    })
    .await?;
    Ok(entries)
}
