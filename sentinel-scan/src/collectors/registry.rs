// sentinel-scan/src/collectors/registry.rs
// Autorun persistence locations via `reg query`

use super::command::{run_command, CommandError};
use super::windows_only;
use sentinel_core::{Collector, Module, RawFinding, Result};
use tracing::debug;

const MAX_FINDINGS: usize = 100;
const SERVICES_KEY: &str = r"HKLM\System\CurrentControlSet\Services";

/// Keys whose values are inspected directly, with their display location.
const VALUE_KEYS: &[(&str, &str)] = &[
    (r"HKCU\Software\Microsoft\Windows\CurrentVersion\Run", "HKCU Run"),
    (r"HKCU\Software\Microsoft\Windows\CurrentVersion\RunOnce", "HKCU RunOnce"),
    (r"HKLM\Software\Microsoft\Windows\CurrentVersion\Run", "HKLM Run"),
    (r"HKLM\Software\Microsoft\Windows\CurrentVersion\RunOnce", "HKLM RunOnce"),
    (r"HKLM\Software\Microsoft\Windows NT\CurrentVersion\Winlogon", "Winlogon"),
    (
        r"HKCU\Software\Microsoft\Windows\CurrentVersion\Explorer\StartupApproved\Run",
        "Startup Approved",
    ),
];

const SUSPICIOUS_PATTERNS: &[(&str, &str)] = &[
    ("powershell", "PowerShell command execution"),
    ("cmd /c", "Command line execution"),
    ("wscript", "Script execution"),
    ("cscript", "Script execution"),
    ("mshta", "HTML Application execution"),
    ("regsvr32", "DLL registration/execution"),
    (".vbs", "VBScript file"),
    (".js", "JavaScript file"),
    (".ps1", "PowerShell script"),
    (".bat", "Batch file"),
    ("\\temp\\", "Temp folder execution"),
    ("\\appdata\\local\\temp", "AppData Temp execution"),
    ("downloadedinstaller", "Downloaded installer"),
    ("http://", "URL reference"),
    ("https://", "URL reference"),
    ("-enc", "Encoded PowerShell"),
    ("-encodedcommand", "Encoded PowerShell"),
    ("bypass", "Execution policy bypass"),
];

const KNOWN_LEGITIMATE: &[&str] = &[
    "securityhealth",
    "windows defender",
    "onedrive",
    "microsoft",
    "realtek",
    "nvidia",
    "intel",
    "amd",
    "synaptics",
    "logitech",
];

/// One value line of `reg query` output under its owning key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegValue {
    pub key: String,
    pub name: String,
    pub kind: String,
    pub data: String,
}

pub struct RegistryCollector;

impl Collector for RegistryCollector {
    fn module(&self) -> &str {
        Module::Registry.as_str()
    }

    fn collect(&self) -> Result<Vec<RawFinding>> {
        if !windows_only(self.module()) {
            return Ok(Vec::new());
        }

        let mut findings = Vec::new();
        for (key, location) in VALUE_KEYS {
            match run_command("reg", &["query", *key]) {
                Ok(output) => findings.extend(
                    parse_reg_query(&output)
                        .into_iter()
                        .map(|value| analyze_entry(&value.name, &value.data, location)),
                ),
                Err(e) => debug!("Skipping {}: {}", key, e),
            }
        }

        match run_command("reg", &["query", SERVICES_KEY, "/s", "/v", "ImagePath"]) {
            Ok(output) => findings.extend(parse_reg_query(&output).into_iter().map(|value| {
                let service = value.key.rsplit('\\').next().unwrap_or(value.key.as_str());
                let mut finding = analyze_entry(service, &value.data, "Service");
                finding.name = format!("[Service] {}", service);
                finding
            })),
            Err(CommandError::AccessDenied { .. }) => debug!("Services key is not readable"),
            Err(e) => debug!("Skipping {}: {}", SERVICES_KEY, e),
        }

        findings.sort_by(|a, b| b.risk_score.cmp(&a.risk_score));
        findings.truncate(MAX_FINDINGS);
        Ok(findings)
    }
}

/// Splits `    <name>    REG_<TYPE>    <data>` into its three columns.
fn split_value_line(line: &str) -> Option<(&str, &str, &str)> {
    let body = line.strip_prefix("    ")?;
    let split = body.find("    REG_")?;
    let name = &body[..split];
    let rest = &body[split + 4..];
    let (kind, data) = rest.split_once("    ").unwrap_or((rest, ""));
    Some((name, kind, data.trim()))
}

/// Parses `reg query` output into values, tracking the `HKEY_...` key lines.
pub fn parse_reg_query(text: &str) -> Vec<RegValue> {
    let mut current_key = String::new();
    let mut values = Vec::new();

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with("HKEY_") {
            current_key = line.trim().to_string();
            continue;
        }
        if let Some((name, kind, data)) = split_value_line(line) {
            values.push(RegValue {
                key: current_key.clone(),
                name: name.to_string(),
                kind: kind.to_string(),
                data: data.to_string(),
            });
        }
    }
    values
}

/// Scores one autorun value. Known vendors are never flagged.
pub fn analyze_entry(name: &str, value: &str, location: &str) -> RawFinding {
    let name_lower = name.to_lowercase();
    let value_lower = value.to_lowercase();
    let legitimate = KNOWN_LEGITIMATE
        .iter()
        .any(|vendor| name_lower.contains(vendor) || value_lower.contains(vendor));

    let mut risk = 0;
    let mut reasons: Vec<&str> = Vec::new();
    if !legitimate {
        for (pattern, description) in SUSPICIOUS_PATTERNS {
            if value_lower.contains(pattern) {
                risk += 25;
                if !reasons.contains(description) {
                    reasons.push(*description);
                }
            }
        }
        if location == "HKCU Run" || location == "HKLM Run" {
            risk += 10;
            reasons.push("Unknown autorun entry");
        }
    }

    let status = if reasons.is_empty() {
        format!("Location: {} | ✓ Appears legitimate", location)
    } else {
        format!("Location: {} | ⚠️ {}", location, reasons.join(", "))
    };

    RawFinding::new(Module::Registry.as_str(), name, status)
        .with_path(value)
        .with_risk_score(risk)
}
