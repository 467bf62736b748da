// sentinel-scan/src/collectors/command.rs
// Subprocess helpers shared by the Windows collectors

use sentinel_core::SentinelError;
use serde_json::Value;
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{program}: access denied")]
    AccessDenied { program: String },

    #[error("{program} printed invalid JSON: {source}")]
    InvalidJson {
        program: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CommandError {
    /// Maps onto the engine error for `module`.
    pub fn into_sentinel(self, module: &str) -> SentinelError {
        match self {
            CommandError::AccessDenied { program } => SentinelError::Permission {
                operation: format!("{} collector", module),
                details: program,
            },
            other => SentinelError::collector(module, other.to_string()),
        }
    }
}

fn looks_denied(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("access is denied") || lower.contains("access denied") || lower.contains("requires elevation")
}

/// Runs `program` to completion and returns its stdout (lossy UTF-8).
pub fn run_command(program: &str, args: &[&str]) -> Result<String, CommandError> {
    debug!("Running {} {:?}", program, args);
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !output.status.success() {
        if looks_denied(&stderr) {
            return Err(CommandError::AccessDenied {
                program: program.to_string(),
            });
        }
        return Err(CommandError::Failed {
            program: program.to_string(),
            code: output.status.code(),
            stderr,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Runs a PowerShell snippet and returns its trimmed stdout.
pub fn powershell(script: &str) -> Result<String, CommandError> {
    run_command(
        "powershell.exe",
        &["-NoProfile", "-NonInteractive", "-Command", script],
    )
    .map(|out| out.trim().to_string())
}

/// Runs a PowerShell pipeline ending in `ConvertTo-Json` and returns its records.
pub fn powershell_json(script: &str) -> Result<Vec<Value>, CommandError> {
    let stdout = powershell(script)?;
    parse_json_records(&stdout).map_err(|source| CommandError::InvalidJson {
        program: "powershell.exe".to_string(),
        source,
    })
}

/// `ConvertTo-Json` prints a bare object for a single result, an array
/// otherwise, and nothing at all for an empty pipeline.
pub fn parse_json_records(text: &str) -> Result<Vec<Value>, serde_json::Error> {
    let text = text.trim_start_matches('\u{feff}').trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(text)? {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Ok(vec![other]),
    }
}

/// String field of a PowerShell JSON record, empty when absent or null.
pub fn json_str(record: &Value, key: &str) -> String {
    match record.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
