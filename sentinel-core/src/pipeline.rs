// sentinel-core/src/pipeline.rs
// Aggregation pipeline: collect, normalize, classify, recommend, enrich

use crate::classifier::SeverityClassifier;
use crate::error::{Result, SentinelError};
use crate::finding::{ClassifiedFinding, RawFinding, Severity};
use crate::metrics::ScanMetrics;
use crate::normalize::normalize;
use crate::recommender::Recommender;
use crate::report::{CollectorOutcome, ScanReport};
use crate::rules::{RuleHandle, RuleStore};
use async_trait::async_trait;
use chrono::Local;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// A blocking source of raw findings for one module.
pub trait Collector: Send + Sync {
    fn module(&self) -> &str;
    fn collect(&self) -> Result<Vec<RawFinding>>;
}

/// Closure-backed collector, see [`collector_fn`].
pub struct FnCollector<F> {
    module: String,
    collect: F,
}

impl<F> Collector for FnCollector<F>
where
    F: Fn() -> Result<Vec<RawFinding>> + Send + Sync,
{
    fn module(&self) -> &str {
        &self.module
    }

    fn collect(&self) -> Result<Vec<RawFinding>> {
        (self.collect)()
    }
}

pub fn collector_fn<F>(module: impl Into<String>, collect: F) -> FnCollector<F>
where
    F: Fn() -> Result<Vec<RawFinding>> + Send + Sync,
{
    FnCollector {
        module: module.into(),
        collect,
    }
}

/// Replacement texts from a remote explanation service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Explanation {
    pub explanation: String,
    pub recommendation: String,
}

/// Optional, non-deterministic enrichment of classified findings.
#[async_trait]
pub trait Explainer: Send + Sync {
    async fn explain(&self, finding: &ClassifiedFinding) -> Result<Explanation>;
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub collector_timeout: Duration,
    pub workers: usize,
    pub explain_min_severity: Severity,
    pub explain_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            collector_timeout: Duration::from_secs(60),
            workers: num_cpus::get(),
            explain_min_severity: Severity::High,
            explain_timeout: Duration::from_secs(20),
        }
    }
}

/// Classifies one finding and attaches its recommendation.
///
/// The recommender's own explanation is discarded; the classifier's wording
/// is the only explanation kept on the finding.
pub fn annotate(store: &RuleStore, finding: RawFinding) -> ClassifiedFinding {
    let verdict = SeverityClassifier::new(store).classify(&finding);
    let advice = Recommender::new(store).recommend(&finding, Some(verdict.severity), &verdict.explanation);
    ClassifiedFinding::new(finding, verdict.severity, verdict.explanation, advice.recommendation)
}

/// Output of [`classify_all`].
#[derive(Debug, Default)]
pub struct Classification {
    pub findings: Vec<ClassifiedFinding>,
    /// Summed worker time
    pub busy: Duration,
    /// Findings lost to a failed worker
    pub dropped: usize,
}

/// Classifies `findings` across `workers` blocking tasks, keeping input order.
pub async fn classify_all(store: Arc<RuleStore>, findings: Vec<RawFinding>, workers: usize) -> Classification {
    classify_chunks(findings, workers, move |finding| annotate(&store, finding)).await
}

async fn classify_chunks<F>(findings: Vec<RawFinding>, workers: usize, classify: F) -> Classification
where
    F: Fn(RawFinding) -> ClassifiedFinding + Send + Sync + 'static,
{
    if findings.is_empty() {
        return Classification::default();
    }

    let workers = workers.max(1);
    let chunk_size = (findings.len() + workers - 1) / workers;
    let mut chunks = Vec::with_capacity(workers);
    let mut rest = findings;
    while !rest.is_empty() {
        let tail = rest.split_off(chunk_size.min(rest.len()));
        chunks.push(rest);
        rest = tail;
    }

    let classify = Arc::new(classify);
    let handles = chunks.into_iter().map(|chunk| {
        let classify = Arc::clone(&classify);
        let len = chunk.len();
        let handle = tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            let classified: Vec<ClassifiedFinding> = chunk.into_iter().map(|f| (*classify)(f)).collect();
            (classified, started.elapsed())
        });
        async move { (len, handle.await) }
    });

    let mut output = Classification::default();
    for (len, result) in join_all(handles).await {
        match result {
            Ok((chunk, elapsed)) => {
                output.findings.extend(chunk);
                output.busy += elapsed;
            }
            Err(e) => {
                error!("❌ Classification worker failed, {} findings dropped: {}", len, e);
                output.dropped += len;
            }
        }
    }
    output
}

pub struct Pipeline {
    rules: Arc<RuleHandle>,
    config: PipelineConfig,
    explainer: Option<Arc<dyn Explainer>>,
}

impl Pipeline {
    pub fn new(rules: Arc<RuleHandle>, config: PipelineConfig) -> Self {
        Self {
            rules,
            config,
            explainer: None,
        }
    }

    pub fn with_explainer(mut self, explainer: Arc<dyn Explainer>) -> Self {
        self.explainer = Some(explainer);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every collector and classifies the combined output. Never fails:
    /// collector errors and timeouts are recorded in the report instead.
    #[instrument(skip_all, fields(collectors = collectors.len()))]
    pub async fn run(&self, collectors: Vec<Arc<dyn Collector>>) -> ScanReport {
        let scan_id = Uuid::new_v4();
        let started_at = Local::now();
        let store = self.rules.current();
        let mut metrics = ScanMetrics::new();

        info!("🔍 Starting scan {} with {} collectors", scan_id, collectors.len());

        let (raw, outcomes) = self.collect_all(collectors, &mut metrics).await;
        let Classification {
            mut findings,
            busy,
            dropped,
        } = classify_all(store, raw, self.config.workers).await;

        for finding in &findings {
            metrics.record_finding(finding.module(), finding.severity());
        }
        metrics.record_classification_time(busy);
        metrics.record_classification_dropped(dropped);

        if let Some(explainer) = &self.explainer {
            self.enrich(explainer.as_ref(), &mut findings, &mut metrics).await;
        }

        let summary = metrics.get_summary();
        info!(
            "✅ Scan {} finished: {} findings ({} high, {} medium, {} low), {} collectors failed, {} timed out",
            scan_id,
            summary.findings,
            summary.high,
            summary.medium,
            summary.low,
            summary.collectors_failed,
            summary.collectors_timed_out
        );

        ScanReport {
            scan_id,
            started_at,
            finished_at: Local::now(),
            findings,
            outcomes,
            metrics,
        }
    }

    async fn collect_all(
        &self,
        collectors: Vec<Arc<dyn Collector>>,
        metrics: &mut ScanMetrics,
    ) -> (Vec<RawFinding>, Vec<CollectorOutcome>) {
        let limit = self.config.collector_timeout;
        let runs = collectors.into_iter().map(|collector| async move {
            let module = collector.module().to_string();
            let task = tokio::task::spawn_blocking({
                let collector = Arc::clone(&collector);
                move || collector.collect()
            });
            let result = match timeout(limit, task).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_error)) => Err(SentinelError::collector(&module, join_error.to_string())),
                Err(_) => Err(SentinelError::collector_timeout(&module, limit)),
            };
            (module, result)
        });

        let mut findings = Vec::new();
        let mut outcomes = Vec::new();
        for (module, result) in join_all(runs).await {
            match result {
                Ok(batch) => {
                    let count = batch.len();
                    findings.extend(batch.into_iter().map(|f| normalize(&module, f)));
                    metrics.record_collector_completed(&module, count);
                    outcomes.push(CollectorOutcome::Completed { module, count });
                }
                Err(e) => {
                    warn!("⚠️  Collector {} contributed no findings: {}", module, e);
                    metrics.record_collector_error(&e);
                    outcomes.push(match e {
                        SentinelError::CollectorTimeout { timeout_ms, .. } => {
                            CollectorOutcome::TimedOut { module, timeout_ms }
                        }
                        other => CollectorOutcome::Failed {
                            module,
                            error: other.to_string(),
                        },
                    });
                }
            }
        }
        (findings, outcomes)
    }

    async fn enrich(&self, explainer: &dyn Explainer, findings: &mut [ClassifiedFinding], metrics: &mut ScanMetrics) {
        let min = self.config.explain_min_severity;
        let limit = self.config.explain_timeout;

        let targets: Vec<usize> = findings
            .iter()
            .enumerate()
            .filter(|(_, f)| f.severity() >= min)
            .map(|(idx, _)| idx)
            .collect();
        if targets.is_empty() {
            return;
        }
        debug!("Requesting remote explanations for {} findings", targets.len());

        let requests = targets.iter().map(|&idx| {
            let finding = &findings[idx];
            async move {
                match timeout(limit, explainer.explain(finding)).await {
                    Ok(result) => result,
                    Err(_) => Err(SentinelError::RemoteExplanation(format!(
                        "no response within {}ms",
                        limit.as_millis()
                    ))),
                }
            }
        });
        let results = join_all(requests).await;

        for (idx, result) in targets.into_iter().zip(results) {
            match result {
                Ok(remote) => {
                    findings[idx] = findings[idx].with_texts(remote.explanation, remote.recommendation);
                    metrics.record_remote_explanation(true);
                }
                Err(e) => {
                    debug!("Keeping rule-based text for {}: {}", findings[idx].name(), e);
                    metrics.record_remote_explanation(false);
                    metrics.record_error(&e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline(store: RuleStore, config: PipelineConfig) -> Pipeline {
        Pipeline::new(Arc::new(RuleHandle::new(store)), config)
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            collector_timeout: Duration::from_millis(200),
            workers: 3,
            ..PipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_scan() {
        let collectors: Vec<Arc<dyn Collector>> = vec![
            Arc::new(collector_fn("Tasks", || Ok(vec![RawFinding::new("", " Backup ", "Ready")]))),
            Arc::new(collector_fn("Registry", || Err(SentinelError::collector("Registry", "access denied")))),
            Arc::new(collector_fn("Network", || {
                std::thread::sleep(Duration::from_secs(2));
                Ok(vec![RawFinding::new("Network", "late", "ESTABLISHED")])
            })),
        ];

        let report = pipeline(RuleStore::empty().unwrap(), fast_config()).run(collectors).await;

        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].module(), "Tasks");
        assert_eq!(report.findings[0].name(), "Backup");
        assert_eq!(report.outcomes[0], CollectorOutcome::Completed { module: "Tasks".to_string(), count: 1 });
        assert!(matches!(report.outcomes[1], CollectorOutcome::Failed { .. }));
        assert!(matches!(report.outcomes[2], CollectorOutcome::TimedOut { timeout_ms: 200, .. }));
        assert_eq!(report.metrics.collectors_failed, 1);
        assert_eq!(report.metrics.collectors_timed_out, 1);
    }

    #[tokio::test]
    async fn test_classify_all_keeps_order() {
        let store = Arc::new(RuleStore::empty().unwrap());
        let findings: Vec<RawFinding> = (0..10)
            .map(|i| RawFinding::new("Tasks", format!("task-{}", i), "Ready").with_risk_score(if i % 2 == 0 { 50 } else { 0 }))
            .collect();

        let output = classify_all(store, findings, 4).await;
        let classified = output.findings;

        assert_eq!(output.dropped, 0);
        assert_eq!(classified.len(), 10);
        for (i, finding) in classified.iter().enumerate() {
            assert_eq!(finding.name(), format!("task-{}", i));
            let expected = if i % 2 == 0 { Severity::High } else { Severity::Low };
            assert_eq!(finding.severity(), expected);
        }
    }

    #[tokio::test]
    async fn test_failed_worker_is_counted() {
        let store = Arc::new(RuleStore::empty().unwrap());
        let findings: Vec<RawFinding> = ["a", "b", "bad", "c"]
            .iter()
            .map(|name| RawFinding::new("Tasks", *name, "Ready"))
            .collect();

        let output = classify_chunks(findings, 2, move |finding| {
            if finding.name == "bad" {
                panic!("unclassifiable finding");
            }
            annotate(&store, finding)
        })
        .await;

        let names: Vec<&str> = output.findings.iter().map(|f| f.name()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(output.dropped, 2);

        let mut metrics = ScanMetrics::new();
        metrics.record_classification_dropped(output.dropped);
        assert_eq!(metrics.classification_dropped, 2);
        assert_eq!(metrics.errors_by_kind.get("classification"), Some(&1));
    }

    struct FixedExplainer;

    #[async_trait]
    impl Explainer for FixedExplainer {
        async fn explain(&self, finding: &ClassifiedFinding) -> Result<Explanation> {
            if finding.name() == "broken" {
                return Err(SentinelError::RemoteExplanation("HTTP 500".to_string()));
            }
            Ok(Explanation {
                explanation: format!("remote: {}", finding.name()),
                recommendation: "remote advice".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_explainer_only_for_high_and_falls_back() {
        let collectors: Vec<Arc<dyn Collector>> = vec![Arc::new(collector_fn("Process", || {
            Ok(vec![
                RawFinding::new("Process", "mimikatz.exe", "CPU: 1%").with_risk_score(80),
                RawFinding::new("Process", "broken", "CPU: 1%").with_risk_score(80),
                RawFinding::new("Process", "notepad.exe", "CPU: 1%"),
            ])
        }))];

        let report = pipeline(RuleStore::empty().unwrap(), fast_config())
            .with_explainer(Arc::new(FixedExplainer))
            .run(collectors)
            .await;

        assert_eq!(report.findings[0].explanation(), "remote: mimikatz.exe");
        assert_eq!(report.findings[0].recommendation(), "remote advice");
        assert_eq!(report.findings[1].explanation(), "High-risk item detected: CPU: 1%");
        assert_eq!(report.findings[1].recommendation(), "Disable or investigate immediately");
        assert_eq!(report.findings[2].explanation(), "Process item notepad.exe status: CPU: 1%");
        assert_eq!(report.metrics.remote_explanations, 1);
        assert_eq!(report.metrics.remote_fallbacks, 1);
    }
}
