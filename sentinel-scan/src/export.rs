// sentinel-scan/src/export.rs
// CSV export of scan findings and the severity summary

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use sentinel_core::{ClassifiedFinding, SeverityCounts};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

const LOG_HEADER: [&str; 8] = [
    "Module",
    "Name",
    "Status",
    "Severity",
    "Date",
    "Time",
    "Explanation",
    "Recommendation",
];
const SUMMARY_HEADER: [&str; 2] = ["Severity Level", "Count"];
const MAX_SUFFIX: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub log: PathBuf,
    pub summary: PathBuf,
}

pub struct Exporter {
    dir: PathBuf,
}

impl Exporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes the detail log and the summary, stamped with `at`.
    pub fn export(&self, findings: &[ClassifiedFinding], at: DateTime<Local>) -> Result<ExportPaths> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create export directory {}", self.dir.display()))?;
        let stamp = at.format("%Y%m%d_%H%M%S").to_string();

        let (log, file) = self.create_unique(&format!("scan_log_{}", stamp))?;
        write_log(file, findings).with_context(|| format!("Failed to write {}", log.display()))?;

        let (summary, file) = self.create_unique(&format!("severity_summary_{}", stamp))?;
        write_summary(file, &SeverityCounts::from_findings(findings))
            .with_context(|| format!("Failed to write {}", summary.display()))?;

        info!("✅ Exported {} findings to {}", findings.len(), log.display());
        Ok(ExportPaths { log, summary })
    }

    /// Opens `<stem>.csv` with create-new semantics, adding `_1`, `_2`, ...
    /// when a file of that name already exists.
    fn create_unique(&self, stem: &str) -> Result<(PathBuf, File)> {
        for n in 0..MAX_SUFFIX {
            let name = if n == 0 {
                format!("{}.csv", stem)
            } else {
                format!("{}_{}.csv", stem, n)
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e).with_context(|| format!("Failed to create {}", path.display())),
            }
        }
        anyhow::bail!("No free file name for {} in {}", stem, self.dir.display())
    }
}

fn write_log(file: File, findings: &[ClassifiedFinding]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(LOG_HEADER)?;
    for finding in findings {
        let timestamp = finding.timestamp();
        let date = timestamp.format("%Y-%m-%d").to_string();
        let time = timestamp.format("%H:%M:%S").to_string();
        writer.write_record([
            finding.module(),
            finding.name(),
            finding.status(),
            finding.severity().as_str(),
            date.as_str(),
            time.as_str(),
            finding.explanation(),
            finding.recommendation(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_summary(file: File, counts: &SeverityCounts) -> Result<()> {
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(SUMMARY_HEADER)?;
    for (level, count) in counts.rows() {
        writer.write_record([level, count.to_string().as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sentinel_core::{RawFinding, Severity};

    fn findings() -> Vec<ClassifiedFinding> {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        vec![
            ClassifiedFinding::new(
                RawFinding::new("Services", "TlntSvr", "Running").with_timestamp(at),
                Severity::High,
                "Service TlntSvr is Running, provides remote access",
                "Disable the service",
            ),
            ClassifiedFinding::new(
                RawFinding::new("Tasks", "\\Updater", "Ready").with_timestamp(at),
                Severity::Low,
                "Task ready",
                "Keep monitoring",
            ),
        ]
    }

    #[test]
    fn test_export_writes_log_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path().join("exported_logs"));
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();

        let paths = exporter.export(&findings(), at).unwrap();
        assert!(paths.log.ends_with("scan_log_20240309_140507.csv"));
        assert!(paths.summary.ends_with("severity_summary_20240309_140507.csv"));

        let mut reader = csv::Reader::from_path(&paths.log).unwrap();
        assert_eq!(reader.headers().unwrap().iter().collect::<Vec<_>>(), LOG_HEADER);
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][1], "TlntSvr");
        assert_eq!(&rows[0][3], "High");
        assert_eq!(&rows[0][4], "2024-03-09");
        assert_eq!(&rows[0][5], "14:05:07");
        assert_eq!(&rows[0][6], "Service TlntSvr is Running, provides remote access");

        let summary = std::fs::read_to_string(&paths.summary).unwrap();
        assert_eq!(summary, "Severity Level,Count\nLow,1\nMedium,0\nHigh,1\nUnknown,0\n");
    }

    #[test]
    fn test_second_export_in_same_second_gets_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path());
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();

        let first = exporter.export(&findings(), at).unwrap();
        let second = exporter.export(&findings(), at).unwrap();
        assert_ne!(first.log, second.log);
        assert!(second.log.ends_with("scan_log_20240309_140507_1.csv"));
        assert!(second.summary.ends_with("severity_summary_20240309_140507_1.csv"));
    }
}
