use std::collections::HashMap;

use cached::proc_macro::cached;
use sysinfo::{PidExt, ProcessExt, System, SystemExt};
use tracing::*;

/// Threads of this process, by thread id.
#[cached(time = 1)]
pub fn process_tasks() -> HashMap<u32, String> {
    let pid = match sysinfo::get_current_pid() {
        Ok(pid) => pid,
        Err(error) => {
            warn!("Failed to get current PID: {error}");
            return HashMap::new();
        }
    };

    let mut system = System::new();
    system.refresh_process(pid);

    #[cfg(target_os = "linux")]
    {
        system
            .process(pid)
            .map(|process| {
                process
                    .tasks
                    .iter()
                    .map(|(pid, task)| (pid.as_u32(), task.name().to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = system;
        HashMap::new()
    }
}
