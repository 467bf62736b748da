// sentinel-scan/src/collectors/wmi.rs
// WMI event subscriptions, falling back to startup commands

use super::command::{json_str, powershell_json};
use super::startup::{startup_commands, STARTUP_QUERY};
use super::windows_only;
use sentinel_core::{Collector, Module, RawFinding, Result};
use serde_json::Value;
use tracing::debug;

// Bindings reference their filter and consumer by path; resolve them so the
// filter name, enabled flag and consumer class end up on one record.
const BINDINGS_QUERY: &str = r#"Get-CimInstance -Namespace root\subscription -ClassName __FilterToConsumerBinding |
    ForEach-Object {
        [pscustomobject]@{
            Name = $_.Filter.Name
            Enabled = if ($null -eq $_.Filter.Enabled) { $true } else { [bool]$_.Filter.Enabled }
            ConsumerClass = $_.Consumer.CimClass.CimClassName
            Query = $_.Filter.Query
        }
    } | ConvertTo-Json -Compress"#;

pub struct WmiCollector;

impl Collector for WmiCollector {
    fn module(&self) -> &str {
        Module::Wmi.as_str()
    }

    fn collect(&self) -> Result<Vec<RawFinding>> {
        if !windows_only(self.module()) {
            return Ok(Vec::new());
        }

        match powershell_json(BINDINGS_QUERY) {
            Ok(records) if !records.is_empty() => return Ok(bindings_from_records(&records)),
            Ok(_) => debug!("No WMI subscriptions found, falling back to startup commands"),
            Err(e) => debug!("WMI subscription query failed ({}), falling back to startup commands", e),
        }

        let records = powershell_json(STARTUP_QUERY).map_err(|e| e.into_sentinel(self.module()))?;
        Ok(startup_commands(Module::Wmi, &records))
    }
}

pub fn bindings_from_records(records: &[Value]) -> Vec<RawFinding> {
    records
        .iter()
        .filter(|record| record.is_object())
        .map(|record| {
            let enabled = record.get("Enabled").and_then(Value::as_bool).unwrap_or(true);
            RawFinding::new(
                Module::Wmi.as_str(),
                json_str(record, "Name"),
                if enabled { "Enabled" } else { "Disabled" },
            )
            .with_start_mode(json_str(record, "ConsumerClass"))
        })
        .collect()
}
