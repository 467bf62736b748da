// sentinel-scan/src/collectors/tasks.rs
// Scheduled tasks from `schtasks /query /v /fo csv`

use super::command::run_command;
use super::windows_only;
use sentinel_core::{Collector, Module, RawFinding, Result, SentinelError};
use tracing::{debug, warn};

const NAME_COLUMN: &str = "TaskName";
const STATUS_COLUMN: &str = "Status";
const COMMAND_COLUMN: &str = "Task To Run";

pub struct TasksCollector;

impl Collector for TasksCollector {
    fn module(&self) -> &str {
        Module::Tasks.as_str()
    }

    fn collect(&self) -> Result<Vec<RawFinding>> {
        if !windows_only(self.module()) {
            return Ok(Vec::new());
        }
        let output = run_command("schtasks", &["/query", "/v", "/fo", "csv"])
            .map_err(|e| e.into_sentinel(self.module()))?;
        parse_schtasks_csv(&output)
    }
}

/// Parses verbose schtasks CSV. The header row is repeated once per task
/// folder; those repeats are skipped. Output without a quoted header row
/// (schtasks prints a single `INFO:` line when there are no tasks) yields
/// no findings.
pub fn parse_schtasks_csv(text: &str) -> Result<Vec<RawFinding>> {
    let first_line = text.trim_start_matches('\u{feff}').lines().map(str::trim).find(|l| !l.is_empty());
    match first_line {
        Some(line) if line.starts_with('"') => {}
        other => {
            debug!("schtasks returned no task table: {}", other.unwrap_or("<empty>"));
            return Ok(Vec::new());
        }
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| SentinelError::collector(Module::Tasks.as_str(), format!("unreadable schtasks header: {}", e)))?
        .clone();
    let column = |name: &str| headers.iter().position(|h| h == name);
    let Some(name_idx) = column(NAME_COLUMN) else {
        return Err(SentinelError::collector(
            Module::Tasks.as_str(),
            format!("schtasks output has no {} column", NAME_COLUMN),
        ));
    };
    let status_idx = column(STATUS_COLUMN);
    let command_idx = column(COMMAND_COLUMN);

    let mut findings = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("⚠️  Skipping schtasks row {}: {}", row, e);
                continue;
            }
        };
        let field = |idx: Option<usize>| idx.and_then(|i| record.get(i)).unwrap_or("");

        let name = field(Some(name_idx));
        if name.is_empty() || name == NAME_COLUMN {
            continue;
        }
        findings.push(
            RawFinding::new(Module::Tasks.as_str(), name, field(status_idx)).with_path(field(command_idx)),
        );
    }
    Ok(findings)
}
