// sentinel-core/src/lib.rs
// Risk classification and explanation engine for host persistence findings

pub mod classifier;
pub mod error;
pub mod finding;
pub mod heuristics;
pub mod metrics;
pub mod normalize;
pub mod pipeline;
pub mod recommender;
pub mod report;
pub mod rules;
pub mod template;

pub use classifier::{Decision, SeverityClassifier, Verdict};
pub use error::{ErrorCategory, ErrorRecovery, Result, SentinelError};
pub use finding::{ClassifiedFinding, Module, RawFinding, Severity};
pub use metrics::{MetricsSummary, ScanMetrics};
pub use pipeline::{
    annotate, classify_all, collector_fn, Classification, Collector, Explainer, Explanation, FnCollector, Pipeline, PipelineConfig,
};
pub use recommender::{fallback_recommendation, Advice, Recommender};
pub use report::{CollectorOutcome, FindingFilter, ScanReport, SeverityCounts};
pub use rules::validation::{RuleValidator, ValidationIssue, ValidationReport, ValidationSeverity};
pub use rules::{RegexCache, RuleHandle, RuleSources, RuleStore};
