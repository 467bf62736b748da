// sentinel-scan/src/collectors/process.rs
// Running process triage

use sentinel_core::{Collector, Module, RawFinding, Result};
use sysinfo::{System, Users};

const MAX_FINDINGS: usize = 150;

/// Name fragment and why it stands out.
const SUSPICIOUS_NAMES: &[(&str, &str)] = &[
    ("mimikatz", "Credential dumping tool"),
    ("lazagne", "Password recovery tool"),
    ("procdump", "Process dumping (potential credential theft)"),
    ("psexec", "Remote execution tool"),
    ("netcat", "Network utility (potential backdoor)"),
    ("nc.exe", "Netcat"),
    ("ncat.exe", "Nmap Netcat"),
    ("powershell_ise", "PowerShell ISE (check for suspicious scripts)"),
    ("wmic", "WMI Command (check context)"),
    ("certutil", "Certificate utility (often abused for downloads)"),
    ("bitsadmin", "BITS Admin (often abused for downloads)"),
    ("mshta", "HTML Application host (script execution)"),
    ("regsvr32", "COM registration (can run scripts)"),
    ("rundll32", "DLL execution (check arguments)"),
    ("cscript", "Script host"),
    ("wscript", "Script host"),
];

const SUSPICIOUS_LOCATIONS: &[&str] = &[
    "\\temp\\",
    "\\tmp\\",
    "\\appdata\\local\\temp\\",
    "\\downloads\\",
    "\\public\\",
    "\\programdata\\",
    "\\users\\public\\",
];

pub const SYSTEM_PROCESSES: &[&str] = &[
    "system",
    "registry",
    "smss.exe",
    "csrss.exe",
    "wininit.exe",
    "services.exe",
    "lsass.exe",
    "svchost.exe",
    "fontdrvhost.exe",
    "dwm.exe",
    "sihost.exe",
    "taskhostw.exe",
    "explorer.exe",
    "shellexperiencehost.exe",
    "searchui.exe",
    "runtimebroker.exe",
    "applicationframehost.exe",
    "systemsettings.exe",
    "settingsynchost.exe",
    "conhost.exe",
    "dllhost.exe",
    "ctfmon.exe",
    "searchindexer.exe",
    "securityhealthservice.exe",
    "securityhealthsystray.exe",
    "spoolsv.exe",
    "audiodg.exe",
    "wmiprvse.exe",
];

/// Snapshot of one process, decoupled from sysinfo for scoring.
#[derive(Debug, Clone, Default)]
pub struct ProcessSample {
    pub pid: u32,
    pub name: String,
    pub path: String,
    pub user: String,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub run_time_secs: u64,
}

pub struct ProcessCollector;

impl Collector for ProcessCollector {
    fn module(&self) -> &str {
        Module::Process.as_str()
    }

    fn collect(&self) -> Result<Vec<RawFinding>> {
        let mut sys = System::new_all();
        // CPU usage is a delta between two refreshes
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        sys.refresh_processes();

        let users = Users::new_with_refreshed_list();
        let total_memory = sys.total_memory().max(1) as f32;

        let samples = sys.processes().iter().map(|(pid, process)| ProcessSample {
            pid: pid.as_u32(),
            name: process.name().to_string(),
            path: process
                .exe()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            user: process
                .user_id()
                .and_then(|uid| users.get_user_by_id(uid))
                .map(|user| user.name().to_string())
                .unwrap_or_default(),
            cpu_percent: process.cpu_usage(),
            memory_percent: process.memory() as f32 / total_memory * 100.0,
            run_time_secs: process.run_time(),
        });

        Ok(rank_processes(samples))
    }
}

/// Risk score and reasons for one process.
pub fn score_process(sample: &ProcessSample) -> (u32, Vec<String>) {
    let name = sample.name.to_lowercase();
    let path = sample.path.to_lowercase();
    let is_system = SYSTEM_PROCESSES.contains(&name.as_str());
    let mut risk = 0;
    let mut reasons = Vec::new();

    if let Some((_, description)) = SUSPICIOUS_NAMES.iter().find(|(fragment, _)| name.contains(fragment)) {
        risk += 50;
        reasons.push(format!("Suspicious tool: {}", description));
    }
    if SUSPICIOUS_LOCATIONS.iter().any(|fragment| path.contains(fragment)) {
        risk += 30;
        reasons.push("Running from suspicious location".to_string());
    }
    if sample.cpu_percent > 80.0 {
        risk += 15;
        reasons.push(format!("High CPU: {:.1}%", sample.cpu_percent));
    }
    if sample.memory_percent > 50.0 {
        risk += 10;
        reasons.push(format!("High Memory: {:.1}%", sample.memory_percent));
    }
    if path.is_empty() && !is_system {
        risk += 25;
        reasons.push("No executable path (potential injection)".to_string());
    }
    if sample.user.to_lowercase().contains("system") && !is_system {
        risk += 20;
        reasons.push("Non-standard process running as SYSTEM".to_string());
    }
    (risk, reasons)
}

pub fn process_finding(sample: &ProcessSample) -> RawFinding {
    let (risk, reasons) = score_process(sample);
    let mut status = format!(
        "CPU: {:.1}% | MEM: {:.1}% | Runtime: {}h {}m",
        sample.cpu_percent,
        sample.memory_percent,
        sample.run_time_secs / 3_600,
        (sample.run_time_secs % 3_600) / 60
    );
    if !reasons.is_empty() {
        status.push_str(&format!(" | ⚠️ {}", reasons.join(", ")));
    }

    RawFinding::new(Module::Process.as_str(), sample.name.as_str(), status)
        .with_path(sample.path.as_str())
        .with_user(sample.user.as_str())
        .with_risk_score(risk)
}

/// Scores every process except the idle pseudo-process, riskiest first.
pub fn rank_processes(samples: impl IntoIterator<Item = ProcessSample>) -> Vec<RawFinding> {
    let mut findings: Vec<RawFinding> = samples
        .into_iter()
        .filter(|sample| sample.pid != 0)
        .map(|sample| process_finding(&sample))
        .collect();
    findings.sort_by(|a, b| b.risk_score.cmp(&a.risk_score));
    findings.truncate(MAX_FINDINGS);
    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str, path: &str) -> ProcessSample {
        ProcessSample {
            pid: 100,
            name: name.to_string(),
            path: path.to_string(),
            user: "DESK\\alice".to_string(),
            cpu_percent: 1.0,
            memory_percent: 2.0,
            run_time_secs: 3 * 3_600 + 25 * 60,
        }
    }

    #[test]
    fn test_credential_tool_in_temp() {
        let (risk, reasons) = score_process(&sample("mimikatz.exe", r"C:\Users\alice\AppData\Local\Temp\mimikatz.exe"));
        assert_eq!(risk, 80);
        assert_eq!(reasons[0], "Suspicious tool: Credential dumping tool");
        assert_eq!(reasons[1], "Running from suspicious location");
    }

    #[test]
    fn test_system_process_without_path_is_quiet() {
        let mut svchost = sample("svchost.exe", "");
        svchost.user = "NT AUTHORITY\\SYSTEM".to_string();
        assert_eq!(score_process(&svchost), (0, Vec::new()));

        let mut odd = sample("updater.exe", "");
        odd.user = "NT AUTHORITY\\SYSTEM".to_string();
        assert_eq!(score_process(&odd).0, 45);
    }

    #[test]
    fn test_status_format() {
        let finding = process_finding(&sample("notepad.exe", r"C:\Windows\notepad.exe"));
        assert_eq!(finding.status, "CPU: 1.0% | MEM: 2.0% | Runtime: 3h 25m");
        assert_eq!(finding.risk_score, 0);

        let mut busy = sample("miner.exe", r"C:\Tools\miner.exe");
        busy.cpu_percent = 95.0;
        let finding = process_finding(&busy);
        assert!(finding.status.ends_with(" | ⚠️ High CPU: 95.0%"), "{}", finding.status);
        assert_eq!(finding.risk_score, 15);
    }

    #[test]
    fn test_rank_skips_idle_and_sorts() {
        let mut idle = sample("System Idle Process", "");
        idle.pid = 0;
        let findings = rank_processes(vec![
            idle,
            sample("notepad.exe", r"C:\Windows\notepad.exe"),
            sample("psexec.exe", r"C:\Tools\psexec.exe"),
        ]);

        let names: Vec<&str> = findings.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["psexec.exe", "notepad.exe"]);
    }

    #[test]
    fn test_rank_caps_results() {
        let samples = (1..=200).map(|pid| ProcessSample {
            pid,
            ..sample("app.exe", r"C:\Apps\app.exe")
        });
        assert_eq!(rank_processes(samples).len(), MAX_FINDINGS);
    }
}
