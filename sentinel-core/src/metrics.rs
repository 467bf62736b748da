// sentinel-core/src/metrics.rs
// Per-scan counters for collectors, classification and remote explanations

use crate::error::{Result, SentinelError};
use crate::finding::Severity;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Counters gathered during one scan
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanMetrics {
    // Findings
    pub findings_total: u64,
    pub findings_by_module: BTreeMap<String, u64>,
    pub findings_by_severity: BTreeMap<Severity, u64>,

    // Collectors
    pub collectors_completed: u64,
    pub collectors_failed: u64,
    pub collectors_timed_out: u64,
    pub errors_by_kind: BTreeMap<String, u64>,

    // Remote explanations
    pub remote_explanations: u64,
    pub remote_fallbacks: u64,

    // Classification
    pub classification_time_ns: u64,
    pub classification_dropped: u64,
}

impl ScanMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_finding(&mut self, module: &str, severity: Severity) {
        self.findings_total += 1;
        *self.findings_by_module.entry(module.to_string()).or_insert(0) += 1;
        *self.findings_by_severity.entry(severity).or_insert(0) += 1;
    }

    pub fn record_collector_completed(&mut self, module: &str, count: usize) {
        self.collectors_completed += 1;
        debug!("Collector {} produced {} findings", module, count);
    }

    pub fn record_collector_error(&mut self, error: &SentinelError) {
        match error {
            SentinelError::CollectorTimeout { .. } => self.collectors_timed_out += 1,
            _ => self.collectors_failed += 1,
        }
        self.record_error(error);
    }

    pub fn record_error(&mut self, error: &SentinelError) {
        *self.errors_by_kind.entry(error.kind().to_string()).or_insert(0) += 1;
    }

    pub fn record_remote_explanation(&mut self, succeeded: bool) {
        if succeeded {
            self.remote_explanations += 1;
        } else {
            self.remote_fallbacks += 1;
        }
    }

    pub fn record_classification_time(&mut self, elapsed: Duration) {
        self.classification_time_ns += elapsed.as_nanos() as u64;
    }

    /// Findings that never reached the report because their worker failed.
    pub fn record_classification_dropped(&mut self, count: usize) {
        if count > 0 {
            self.classification_dropped += count as u64;
            *self.errors_by_kind.entry("classification".to_string()).or_insert(0) += 1;
        }
    }

    /// Mean classification cost per finding
    pub fn avg_classification_time_ns(&self) -> u64 {
        if self.findings_total == 0 {
            0
        } else {
            self.classification_time_ns / self.findings_total
        }
    }

    pub fn error_count(&self) -> u64 {
        self.errors_by_kind.values().sum()
    }

    pub fn get_summary(&self) -> MetricsSummary {
        MetricsSummary {
            findings: self.findings_total,
            high: self.count(Severity::High),
            medium: self.count(Severity::Medium),
            low: self.count(Severity::Low),
            collectors_failed: self.collectors_failed,
            collectors_timed_out: self.collectors_timed_out,
            avg_classification_time_us: self.avg_classification_time_ns() as f64 / 1_000.0,
            remote_fallbacks: self.remote_fallbacks,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| SentinelError::Serialization {
            context: "scan metrics".to_string(),
            source: Box::new(e),
        })
    }

    fn count(&self, severity: Severity) -> u64 {
        self.findings_by_severity.get(&severity).copied().unwrap_or(0)
    }
}

/// Condensed view for the end-of-scan log line
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSummary {
    pub findings: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
    pub collectors_failed: u64,
    pub collectors_timed_out: u64,
    pub avg_classification_time_us: f64,
    pub remote_fallbacks: u64,
}
