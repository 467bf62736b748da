// sentinel-scan/src/collectors/external.rs
// User-configured commands that print finding records as JSON

use super::command::{parse_json_records, run_command, CommandError};
use crate::config::ExternalCollectorConfig;
use chrono::Local;
use sentinel_core::normalize::findings_from_json;
use sentinel_core::{Collector, RawFinding, Result};
use tracing::debug;

pub struct ExternalCollector {
    module: String,
    command: String,
    args: Vec<String>,
}

impl ExternalCollector {
    pub fn new(config: &ExternalCollectorConfig) -> Self {
        Self {
            module: config.module.clone(),
            command: config.command.clone(),
            args: config.args.clone(),
        }
    }
}

impl Collector for ExternalCollector {
    fn module(&self) -> &str {
        &self.module
    }

    fn collect(&self) -> Result<Vec<RawFinding>> {
        let args: Vec<&str> = self.args.iter().map(String::as_str).collect();
        let output = run_command(&self.command, &args).map_err(|e| e.into_sentinel(&self.module))?;
        let records = parse_json_records(&output)
            .map_err(|source| {
                CommandError::InvalidJson {
                    program: self.command.clone(),
                    source,
                }
                .into_sentinel(&self.module)
            })?;
        debug!("{} printed {} records", self.command, records.len());
        Ok(findings_from_json(&self.module, &records, Local::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector(command: &str, args: &[&str]) -> ExternalCollector {
        ExternalCollector::new(&ExternalCollectorConfig {
            module: "Custom".to_string(),
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        })
    }

    #[cfg(unix)]
    #[test]
    fn test_collects_json_records() {
        let script = r#"echo '[{"name":"agent","status":"Running","riskScore":"45"},"junk"]'"#;
        let findings = collector("sh", &["-c", script]).collect().unwrap();

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].module, "Custom");
        assert_eq!(findings[0].name, "agent");
        assert_eq!(findings[0].risk_score, 45);
    }

    #[cfg(unix)]
    #[test]
    fn test_invalid_json_is_collector_error() {
        let err = collector("sh", &["-c", "echo not-json"]).collect().unwrap_err();
        assert_eq!(err.kind(), "collector");
    }

    #[test]
    fn test_missing_command_is_collector_error() {
        let err = collector("sentinel-no-such-collector", &[]).collect().unwrap_err();
        assert_eq!(err.kind(), "collector");
        assert!(err.to_string().contains("Custom"));
    }
}
