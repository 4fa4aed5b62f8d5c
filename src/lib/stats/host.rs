use serde::{Deserialize, Serialize};
use sysinfo::{System, SystemExt};
use tracing::*;

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct KernelInfo {
    pub arch: String,
    pub version: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct HostEntry {
    pub hostname: String,
    pub kernel: KernelInfo,
    pub uptime: String,
}

lazy_static! {
    static ref KERNEL_ARCH: String = kernel_arch();
}

/// Machine name reported by the running kernel, the build target if `uname` is unavailable.
fn kernel_arch() -> String {
    match std::process::Command::new("uname").arg("-m").output() {
        Ok(output) if output.status.success() => {
            let arch = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !arch.is_empty() {
                return arch;
            }
            warn!("uname reported an empty machine name.");
        }
        Ok(output) => warn!("uname failed with {}.", output.status),
        Err(error) => warn!("Failed to run uname: {error}."),
    }

    std::env::consts::ARCH.to_string()
}

#[instrument(level = "debug")]
pub fn host_info() -> HostEntry {
    let system = System::new();

    let hostname = system.host_name().unwrap_or_else(|| {
        warn!("Failed to fetch hostname.");
        String::new()
    });

    let version = system.kernel_version().unwrap_or_else(|| {
        warn!("Failed to fetch kernel version.");
        String::new()
    });

    HostEntry {
        hostname,
        kernel: KernelInfo {
            arch: KERNEL_ARCH.clone(),
            version,
        },
        uptime: format_uptime(system.uptime()),
    }
}

fn plural(count: u64) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

/// Human readable uptime, e.g. "2 days, 5 hours, 30 minutes".
pub fn format_uptime(seconds: u64) -> String {
    if seconds == 0 {
        return "just booted".to_string();
    }

    let days = seconds / 86_400;
    let hours = (seconds / 3_600) % 24;
    let minutes = (seconds / 60) % 60;

    let mut parts = Vec::with_capacity(3);
    if days > 0 {
        parts.push(format!("{days} day{}", plural(days)));
    }
    if hours > 0 || days > 0 {
        parts.push(format!("{hours} hour{}", plural(hours)));
    }
    if minutes > 0 || parts.is_empty() {
        parts.push(format!("{minutes} minute{}", plural(minutes)));
    }

    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_formatting() {
        let cases = vec![
            (0, "just booted"),
            (59, "0 minutes"),
            (60, "1 minute"),
            (3_600, "1 hour"),
            (3_660, "1 hour, 1 minute"),
            (86_400, "1 day, 0 hours"),
            (90_061, "1 day, 1 hour, 1 minute"),
            (2 * 86_400 + 5 * 3_600 + 30 * 60, "2 days, 5 hours, 30 minutes"),
        ];

        for (seconds, expected) in cases {
            assert_eq!(format_uptime(seconds), expected, "for {seconds} seconds");
        }
    }

    #[test]
    fn host_entry_has_arch() {
        let host = host_info();
        assert!(!host.kernel.arch.is_empty());
        assert_eq!(host.kernel.arch, kernel_arch());
        assert!(!host.uptime.is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn arch_comes_from_the_running_kernel() {
        let uname = std::process::Command::new("uname")
            .arg("-m")
            .output()
            .unwrap();
        let machine = String::from_utf8(uname.stdout).unwrap();

        assert_eq!(kernel_arch(), machine.trim());
    }
}
