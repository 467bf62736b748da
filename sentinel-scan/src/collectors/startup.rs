// sentinel-scan/src/collectors/startup.rs
// Startup commands via Win32_StartupCommand

use super::command::{json_str, powershell_json};
use super::windows_only;
use sentinel_core::{Collector, Module, RawFinding, Result};
use serde_json::Value;

pub(crate) const STARTUP_QUERY: &str = "Get-CimInstance Win32_StartupCommand | \
    Select-Object Name,Command,User | ConvertTo-Json -Compress";

pub struct StartupCollector;

impl Collector for StartupCollector {
    fn module(&self) -> &str {
        Module::Startup.as_str()
    }

    fn collect(&self) -> Result<Vec<RawFinding>> {
        if !windows_only(self.module()) {
            return Ok(Vec::new());
        }
        let records = powershell_json(STARTUP_QUERY).map_err(|e| e.into_sentinel(self.module()))?;
        Ok(startup_commands(Module::Startup, &records))
    }
}

/// Startup commands carry no state; the command line is the path and the
/// owning user goes in the start-mode column.
pub fn startup_commands(module: Module, records: &[Value]) -> Vec<RawFinding> {
    records
        .iter()
        .filter(|record| record.is_object())
        .map(|record| {
            RawFinding::new(module.as_str(), json_str(record, "Name"), "")
                .with_path(json_str(record, "Command"))
                .with_start_mode(json_str(record, "User"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::command::parse_json_records;

    #[test]
    fn test_single_object_output() {
        let records =
            parse_json_records(r#"{"Name":"OneDrive","Command":"\"C:\\Users\\a\\OneDrive.exe\" /background","User":"DESK\\a"}"#)
                .unwrap();
        let findings = startup_commands(Module::Startup, &records);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].status, "");
        assert_eq!(findings[0].start_mode, r"DESK\a");
        assert!(findings[0].path.contains("/background"));
    }
}
