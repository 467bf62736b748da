// sentinel-scan/src/collectors/services.rs
// Windows services via Win32_Service

use super::command::{json_str, powershell_json};
use super::windows_only;
use sentinel_core::{Collector, Module, RawFinding, Result};
use serde_json::Value;

const QUERY: &str = "Get-CimInstance Win32_Service | \
    Select-Object Name,State,PathName,StartMode | ConvertTo-Json -Compress";

pub struct ServicesCollector;

impl Collector for ServicesCollector {
    fn module(&self) -> &str {
        Module::Services.as_str()
    }

    fn collect(&self) -> Result<Vec<RawFinding>> {
        if !windows_only(self.module()) {
            return Ok(Vec::new());
        }
        let records = powershell_json(QUERY).map_err(|e| e.into_sentinel(self.module()))?;
        Ok(services_from_records(&records))
    }
}

pub fn services_from_records(records: &[Value]) -> Vec<RawFinding> {
    records
        .iter()
        .filter(|record| record.is_object())
        .map(|record| {
            RawFinding::new(Module::Services.as_str(), json_str(record, "Name"), json_str(record, "State"))
                .with_path(json_str(record, "PathName"))
                .with_start_mode(json_str(record, "StartMode"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::command::parse_json_records;

    #[test]
    fn test_services_from_records() {
        let records = parse_json_records(
            r#"[{"Name":"TlntSvr","State":"Running","PathName":"C:\\Windows\\System32\\tlntsvr.exe","StartMode":"Auto"},
                {"Name":"Spooler","State":"Stopped","PathName":null,"StartMode":"Manual"},
                42]"#,
        )
        .unwrap();

        let findings = services_from_records(&records);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].name, "TlntSvr");
        assert_eq!(findings[0].status, "Running");
        assert_eq!(findings[0].start_mode, "Auto");
        assert!(findings[0].path.ends_with("tlntsvr.exe"));
        assert_eq!(findings[1].path, "");
        assert_eq!(findings[1].module, "Services");
    }
}
