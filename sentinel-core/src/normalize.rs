// sentinel-core/src/normalize.rs
// Normalization of collector output into RawFinding

use crate::finding::RawFinding;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde_json::{Map, Value};
use tracing::warn;

/// Tags `finding` with `module` and tidies its free-text fields.
pub fn normalize(module: &str, mut finding: RawFinding) -> RawFinding {
    finding.module = module.to_string();
    trim_in_place(&mut finding.name);
    trim_in_place(&mut finding.status);
    trim_in_place(&mut finding.path);
    trim_in_place(&mut finding.start_mode);
    trim_in_place(&mut finding.user);
    finding
}

fn trim_in_place(field: &mut String) {
    let trimmed = field.trim();
    if trimmed.len() != field.len() {
        *field = trimmed.to_string();
    }
}

/// Converts loosely-shaped JSON records (as printed by external collectors)
/// into findings. Non-object entries are skipped.
pub fn findings_from_json(module: &str, records: &[Value], scan_time: DateTime<Local>) -> Vec<RawFinding> {
    records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| match record.as_object() {
            Some(object) => Some(normalize(module, finding_from_object(module, object, scan_time))),
            None => {
                warn!("Skipping {} record #{}: expected an object, got {}", module, index, record);
                None
            }
        })
        .collect()
}

fn finding_from_object(module: &str, object: &Map<String, Value>, scan_time: DateTime<Local>) -> RawFinding {
    let risk_score = ["riskScore", "risk_score"]
        .iter()
        .find_map(|key| object.get(*key))
        .map(value_to_score)
        .unwrap_or(0);

    let timestamp = object
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .unwrap_or(scan_time);

    RawFinding::new(
        module,
        text_field(object, &["name", "Name"]),
        text_field(object, &["status", "Status", "State", "state"]),
    )
    .with_path(text_field(object, &["path", "Path"]))
    .with_start_mode(text_field(object, &["startMode", "start_mode", "StartMode"]))
    .with_user(text_field(object, &["user", "User"]))
    .with_risk_score(risk_score)
    .with_timestamp(timestamp)
}

/// First present key wins.
fn text_field(object: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| object.get(*key))
        .map(value_to_text)
        .unwrap_or_default()
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Numbers and numeric strings are truncated; negatives and junk become 0.
fn value_to_score(value: &Value) -> u32 {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(n) if n.is_finite() && n > 0.0 => n.min(u32::MAX as f64) as u32,
        _ => 0,
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<Local>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Local));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_tags_and_trims() {
        let finding = normalize("Tasks", RawFinding::new("", "  \\Updater ", "Ready\r\n"));
        assert_eq!(finding.module, "Tasks");
        assert_eq!(finding.name, "\\Updater");
        assert_eq!(finding.status, "Ready");
    }

    #[test]
    fn test_loose_records() {
        let now = Local::now();
        let records = vec![
            json!({"name": "agent", "status": "Running", "riskScore": "45", "start_mode": "Auto"}),
            json!({"Name": "beacon", "State": 3, "risk_score": 27.9, "path": null}),
            json!("not a record"),
            json!({"name": "neg", "riskScore": -5, "timestamp": "2024-03-01T10:30:00"}),
        ];
        let findings = findings_from_json("Custom", &records, now);

        assert_eq!(findings.len(), 3);
        assert_eq!(findings[0].risk_score, 45);
        assert_eq!(findings[0].start_mode, "Auto");
        assert_eq!(findings[0].timestamp, now);
        assert_eq!(findings[1].name, "beacon");
        assert_eq!(findings[1].status, "3");
        assert_eq!(findings[1].risk_score, 27);
        assert_eq!(findings[1].path, "");
        assert_eq!(findings[2].risk_score, 0);
        assert_eq!(findings[2].timestamp.format("%Y-%m-%d %H:%M").to_string(), "2024-03-01 10:30");
        assert!(findings.iter().all(|f| f.module == "Custom"));
    }

    #[test]
    fn test_rfc3339_timestamp() {
        let parsed = parse_timestamp("2024-03-01T10:30:00Z").unwrap();
        assert_eq!(parsed, DateTime::parse_from_rfc3339("2024-03-01T10:30:00Z").unwrap());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
