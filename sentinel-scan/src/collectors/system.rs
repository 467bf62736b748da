// sentinel-scan/src/collectors/system.rs
// Host posture facts: uptime, protection, disk, memory, identity, updates

use super::command::powershell;
use sentinel_core::{Collector, Module, RawFinding, Result};
use sysinfo::{Disks, System};
use tracing::debug;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

const DEFENDER_QUERY: &str = "Get-MpComputerStatus | Select-Object -ExpandProperty RealTimeProtectionEnabled";
const FIREWALL_QUERY: &str =
    "(Get-NetFirewallProfile -Profile Domain,Public,Private | Select-Object -ExpandProperty Enabled) -contains $true";
const UPDATES_QUERY: &str =
    "(New-Object -ComObject Microsoft.Update.Session).CreateUpdateSearcher().Search('IsInstalled=0').Updates.Count";

pub struct SystemCollector;

impl Collector for SystemCollector {
    fn module(&self) -> &str {
        Module::System.as_str()
    }

    fn collect(&self) -> Result<Vec<RawFinding>> {
        let mut findings = vec![uptime_finding(System::uptime())];

        if cfg!(windows) {
            findings.push(protection_finding("Windows Defender", query_flag(DEFENDER_QUERY)));
            findings.push(protection_finding("Windows Firewall", query_flag(FIREWALL_QUERY)));
        }

        let disks = Disks::new_with_refreshed_list();
        let system_disk = disks.list().iter().find(|disk| {
            let mount = disk.mount_point().to_string_lossy();
            if cfg!(windows) {
                mount.eq_ignore_ascii_case("C:\\")
            } else {
                mount == "/"
            }
        });
        match system_disk {
            Some(disk) => findings.push(disk_finding(
                &disk.mount_point().to_string_lossy(),
                disk.total_space(),
                disk.available_space(),
            )),
            None => debug!("System disk not found, skipping disk space check"),
        }

        let mut sys = System::new();
        sys.refresh_memory();
        if let Some(finding) = memory_finding(sys.total_memory(), sys.available_memory()) {
            findings.push(finding);
        }

        findings.push(fact("Hostname", System::host_name().unwrap_or_else(|| "Unknown".to_string())));
        findings.push(fact(
            "OS Version",
            System::long_os_version().unwrap_or_else(|| std::env::consts::OS.to_string()),
        ));

        if cfg!(windows) {
            let pending = powershell(UPDATES_QUERY).ok().and_then(|out| out.parse::<u64>().ok());
            findings.push(updates_finding(pending));
        }

        Ok(findings)
    }
}

fn fact(name: &str, status: impl Into<String>) -> RawFinding {
    RawFinding::new(Module::System.as_str(), name, status)
}

fn query_flag(script: &str) -> Option<bool> {
    match powershell(script) {
        Ok(out) => Some(out.eq_ignore_ascii_case("true")),
        Err(e) => {
            debug!("Protection status query failed: {}", e);
            None
        }
    }
}

pub fn uptime_finding(uptime_secs: u64) -> RawFinding {
    let days = uptime_secs / 86_400;
    let hours = (uptime_secs % 86_400) / 3_600;
    let risk = if days > 30 {
        50
    } else if days > 7 {
        20
    } else {
        0
    };
    fact("Uptime", format!("{} days, {} hours", days, hours)).with_risk_score(risk)
}

/// `None` means the state could not be queried.
pub fn protection_finding(name: &str, enabled: Option<bool>) -> RawFinding {
    let disabled_risk = if name.contains("Defender") { 80 } else { 70 };
    match enabled {
        Some(true) => fact(name, "Enabled ✓"),
        Some(false) => fact(name, "⚠️ DISABLED").with_risk_score(disabled_risk),
        None => fact(name, "Unable to check status").with_risk_score(10),
    }
}

pub fn disk_finding(mount_point: &str, total: u64, available: u64) -> RawFinding {
    let label = if mount_point.len() > 1 {
        mount_point.trim_end_matches(['\\', '/'])
    } else {
        mount_point
    };
    let used = percent_used(total, available);
    let free_gb = available as f64 / GIB;

    let (status, risk) = if used > 95.0 {
        (format!("⚠️ CRITICAL: {:.1}% used ({:.1} GB free)", used, free_gb), 50)
    } else if used > 85.0 {
        (format!("Warning: {:.1}% used ({:.1} GB free)", used, free_gb), 20)
    } else {
        (format!("{:.1}% used ({:.1} GB free)", used, free_gb), 0)
    };
    fact(&format!("Disk Space ({})", label), status)
        .with_path(mount_point)
        .with_risk_score(risk)
}

pub fn memory_finding(total: u64, available: u64) -> Option<RawFinding> {
    if total == 0 {
        return None;
    }
    let used = percent_used(total, available);
    let available_gb = available as f64 / GIB;

    let (status, risk) = if used > 90.0 {
        (format!("⚠️ High usage: {:.1}% ({:.1} GB available)", used, available_gb), 40)
    } else if used > 75.0 {
        (format!("Elevated: {:.1}% ({:.1} GB available)", used, available_gb), 15)
    } else {
        (format!("{:.1}% used ({:.1} GB available)", used, available_gb), 0)
    };
    Some(fact("Memory Usage", status).with_risk_score(risk))
}

/// `None` means the update searcher could not be queried.
pub fn updates_finding(pending: Option<u64>) -> RawFinding {
    match pending {
        Some(count) if count > 10 => fact("Windows Updates", format!("⚠️ {} updates pending!", count)).with_risk_score(40),
        Some(count) if count > 0 => fact("Windows Updates", format!("{} updates available", count)).with_risk_score(15),
        Some(_) => fact("Windows Updates", "System is up to date ✓"),
        None => fact("Windows Updates", "Unable to check").with_risk_score(5),
    }
}

fn percent_used(total: u64, available: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    total.saturating_sub(available) as f64 / total as f64 * 100.0
}
