use std::{collections::BTreeMap, fmt};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sysinfo::{PidExt, ProcessExt, System, SystemExt};
use tracing::*;

use crate::helper;

/// Point in time memory usage of this process and its host.
#[derive(Clone, Debug, Serialize)]
pub struct MemoryProfile {
    pub captured_at: DateTime<Utc>,
    pub pid: u32,
    pub resident_bytes: u64,
    pub virtual_bytes: u64,
    pub host_total_bytes: u64,
    pub host_used_bytes: u64,
    pub host_available_bytes: u64,
    /// Thread count per thread name
    pub threads: BTreeMap<String, usize>,
}

#[instrument(level = "debug")]
pub fn snapshot() -> Result<MemoryProfile> {
    let pid = sysinfo::get_current_pid().map_err(|error| anyhow!("{error}"))?;

    let mut system = System::new();
    system.refresh_memory();
    system.refresh_process(pid);

    let process = system
        .process(pid)
        .context("Current process is not visible to the system")?;

    let mut threads = BTreeMap::new();
    for name in helper::threads::process_tasks().into_values() {
        *threads.entry(name).or_insert(0) += 1;
    }

    Ok(MemoryProfile {
        captured_at: Utc::now(),
        pid: pid.as_u32(),
        resident_bytes: process.memory(),
        virtual_bytes: process.virtual_memory(),
        host_total_bytes: system.total_memory(),
        host_used_bytes: system.used_memory(),
        host_available_bytes: system.available_memory(),
        threads,
    })
}

fn mebibytes(bytes: u64) -> f64 {
    bytes as f64 / f64::powf(2.0, 20.0)
}

impl fmt::Display for MemoryProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "memory profile: pid {} at {}", self.pid, self.captured_at.to_rfc3339())?;
        writeln!(f)?;
        writeln!(
            f,
            "# process resident = {} ({:.1} MiB)",
            self.resident_bytes,
            mebibytes(self.resident_bytes)
        )?;
        writeln!(
            f,
            "# process virtual = {} ({:.1} MiB)",
            self.virtual_bytes,
            mebibytes(self.virtual_bytes)
        )?;
        writeln!(f, "# host total = {}", self.host_total_bytes)?;
        writeln!(f, "# host used = {}", self.host_used_bytes)?;
        writeln!(f, "# host available = {}", self.host_available_bytes)?;
        writeln!(f)?;

        let total_threads: usize = self.threads.values().sum();
        writeln!(f, "threads: {total_threads}")?;
        for (name, count) in &self.threads {
            writeln!(f, "{count:>6} {name}")?;
        }

        Ok(())
    }
}
