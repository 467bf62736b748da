// sentinel-core/src/report.rs
// Ordered scan results and the views used by display and export

use crate::finding::{ClassifiedFinding, Severity};
use crate::metrics::ScanMetrics;
use chrono::{DateTime, Local};
use serde::Serialize;
use uuid::Uuid;

/// How a single collector fared during a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CollectorOutcome {
    Completed { module: String, count: usize },
    Failed { module: String, error: String },
    TimedOut { module: String, timeout_ms: u64 },
}

impl CollectorOutcome {
    pub fn module(&self) -> &str {
        match self {
            CollectorOutcome::Completed { module, .. }
            | CollectorOutcome::Failed { module, .. }
            | CollectorOutcome::TimedOut { module, .. } => module,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CollectorOutcome::Completed { .. })
    }
}

/// Console/export filter. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct FindingFilter {
    pub severity: Option<Severity>,
    /// Compared case-insensitively
    pub module: Option<String>,
}

impl FindingFilter {
    pub fn matches(&self, finding: &ClassifiedFinding) -> bool {
        if let Some(severity) = self.severity {
            if finding.severity() != severity {
                return false;
            }
        }
        if let Some(module) = &self.module {
            if !finding.module().eq_ignore_ascii_case(module) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub low: u64,
    pub medium: u64,
    pub high: u64,
    pub unknown: u64,
}

impl SeverityCounts {
    pub fn from_findings<'a>(findings: impl IntoIterator<Item = &'a ClassifiedFinding>) -> Self {
        let mut counts = Self::default();
        for finding in findings {
            match finding.severity() {
                Severity::Low => counts.low += 1,
                Severity::Medium => counts.medium += 1,
                Severity::High => counts.high += 1,
            }
        }
        counts
    }

    /// Summary rows in export order
    pub fn rows(&self) -> [(&'static str, u64); 4] {
        [
            ("Low", self.low),
            ("Medium", self.medium),
            ("High", self.high),
            ("Unknown", self.unknown),
        ]
    }

    pub fn total(&self) -> u64 {
        self.low + self.medium + self.high + self.unknown
    }
}

/// Everything one scan produced
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub scan_id: Uuid,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub findings: Vec<ClassifiedFinding>,
    pub outcomes: Vec<CollectorOutcome>,
    pub metrics: ScanMetrics,
}

impl ScanReport {
    /// Report over already classified findings, e.g. for re-export.
    pub fn from_findings(findings: Vec<ClassifiedFinding>) -> Self {
        let now = Local::now();
        let mut metrics = ScanMetrics::new();
        for finding in &findings {
            metrics.record_finding(finding.module(), finding.severity());
        }
        Self {
            scan_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            findings,
            outcomes: Vec::new(),
            metrics,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    /// High, then Medium, then Low; collection order kept within a level.
    pub fn sorted_by_severity(&self) -> Vec<&ClassifiedFinding> {
        let mut sorted: Vec<&ClassifiedFinding> = self.findings.iter().collect();
        sorted.sort_by_key(|f| Severity::display_rank(Some(f.severity())));
        sorted
    }

    pub fn filter(&self, filter: &FindingFilter) -> Vec<&ClassifiedFinding> {
        self.findings.iter().filter(|f| filter.matches(f)).collect()
    }

    pub fn severity_counts(&self) -> SeverityCounts {
        SeverityCounts::from_findings(&self.findings)
    }

    pub fn failed_collectors(&self) -> impl Iterator<Item = &CollectorOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::RawFinding;

    fn finding(module: &str, name: &str, severity: Severity) -> ClassifiedFinding {
        ClassifiedFinding::new(RawFinding::new(module, name, "x"), severity, "", "")
    }

    fn report() -> ScanReport {
        ScanReport::from_findings(vec![
            finding("Tasks", "a", Severity::Low),
            finding("Services", "b", Severity::High),
            finding("WMI", "c", Severity::Medium),
            finding("Services", "d", Severity::Low),
            finding("Tasks", "e", Severity::High),
        ])
    }

    #[test]
    fn test_sort_is_stable_by_severity() {
        let report = report();
        let names: Vec<&str> = report.sorted_by_severity().iter().map(|f| f.name()).collect();
        assert_eq!(names, ["b", "e", "c", "a", "d"]);
    }

    #[test]
    fn test_filter_by_module_and_severity() {
        let report = report();
        let filter = FindingFilter {
            severity: Some(Severity::Low),
            module: Some("services".to_string()),
        };
        let names: Vec<&str> = report.filter(&filter).iter().map(|f| f.name()).collect();
        assert_eq!(names, ["d"]);
        assert_eq!(report.filter(&FindingFilter::default()).len(), 5);
    }

    #[test]
    fn test_counts_rows_in_export_order() {
        let counts = report().severity_counts();
        assert_eq!(counts.rows(), [("Low", 2), ("Medium", 1), ("High", 2), ("Unknown", 0)]);
        assert_eq!(counts.total(), 5);
    }
}
