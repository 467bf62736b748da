// sentinel-core/src/classifier.rs
// Severity classification: heuristics, module rules, warning markers, defaults

use crate::finding::{RawFinding, Severity};
use crate::heuristics;
use crate::rules::{MatcherKind, RuleStore};
use crate::template::render_lenient;
use tracing::trace;

const WARNING_GLYPH: char = '\u{26A0}';
const DISABLED_TOKEN: &str = "DISABLED";
const ERROR_TOKEN: &str = "error";

/// Which stage produced a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    RiskScore,
    Uptime,
    SuspiciousPath,
    SuspiciousCommand,
    ModuleRule { rule: String, matcher: MatcherKind },
    WarningMarker,
    ModuleDefault,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub severity: Severity,
    pub explanation: String,
    pub decision: Decision,
}

impl Verdict {
    pub fn new(severity: Severity, explanation: impl Into<String>, decision: Decision) -> Self {
        Self {
            severity,
            explanation: explanation.into(),
            decision,
        }
    }
}

/// True when the status carries a generic warning marker.
pub fn has_warning_marker(status: &str) -> bool {
    status.contains(WARNING_GLYPH)
        || status.contains(DISABLED_TOKEN)
        || status.to_lowercase().contains(ERROR_TOKEN)
}

pub struct SeverityClassifier<'a> {
    rules: &'a RuleStore,
}

impl<'a> SeverityClassifier<'a> {
    pub fn new(rules: &'a RuleStore) -> Self {
        Self { rules }
    }

    /// Total over every finding; never fails.
    pub fn classify(&self, finding: &RawFinding) -> Verdict {
        let verdict = heuristics::preclassify(self.rules, finding).unwrap_or_else(|| self.apply_module_rules(finding));
        trace!("{} -> {} via {:?}", finding, verdict.severity, verdict.decision);
        verdict
    }

    fn apply_module_rules(&self, finding: &RawFinding) -> Verdict {
        let set = self.rules.severity_rules(&finding.module);
        let params = [
            ("name", finding.name.as_str()),
            ("state", finding.status.as_str()),
            ("path", finding.path.as_str()),
            ("module", finding.module.as_str()),
        ];

        if let Some((rule, matcher)) = set.first_match(finding) {
            return Verdict::new(
                rule.severity,
                render_lenient(&rule.explanation, &params),
                Decision::ModuleRule {
                    rule: rule.name.clone(),
                    matcher,
                },
            );
        }

        if has_warning_marker(&finding.status) {
            return Verdict::new(
                Severity::High,
                format!("{} item '{}': {}", finding.module, finding.name, finding.status),
                Decision::WarningMarker,
            );
        }

        if let Some(default) = &set.default {
            let explanation = match &default.explanation {
                Some(template) => render_lenient(template, &params),
                None => generic_explanation(finding),
            };
            return Verdict::new(default.severity, explanation, Decision::ModuleDefault);
        }

        Verdict::new(Severity::Low, generic_explanation(finding), Decision::Fallback)
    }
}

fn generic_explanation(finding: &RawFinding) -> String {
    format!("{} item {} status: {}", finding.module, finding.name, finding.status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(severity_rules: &str) -> RuleStore {
        RuleStore::from_json(severity_rules, "[]").unwrap()
    }

    #[test]
    fn test_warning_markers() {
        assert!(has_warning_marker("⚠️ DISABLED"));
        assert!(has_warning_marker("Real-time protection DISABLED"));
        assert!(has_warning_marker("Query ERROR 0x5"));
        assert!(!has_warning_marker("disabled"));
        assert!(!has_warning_marker("Enabled ✓"));
    }

    #[test]
    fn test_first_declared_rule_wins() {
        let store = store(
            r#"{"Tasks": {
                "ready": {"match": {"stateIn": ["Ready"]}, "severity": "Low", "explanation": "{name} is {state}"},
                "any": {"match": {"stateNot": "Disabled"}, "severity": "High", "explanation": "x"}
            }}"#,
        );
        let classifier = SeverityClassifier::new(&store);
        let verdict = classifier.classify(&RawFinding::new("Tasks", "Backup", "Ready"));

        assert_eq!(verdict.severity, Severity::Low);
        assert_eq!(verdict.explanation, "Backup is Ready");
        assert_eq!(
            verdict.decision,
            Decision::ModuleRule {
                rule: "ready".to_string(),
                matcher: MatcherKind::StateIn
            }
        );

        let verdict = classifier.classify(&RawFinding::new("Tasks", "Backup", "Queued"));
        assert_eq!(verdict.severity, Severity::High);
    }

    #[test]
    fn test_marker_before_default() {
        let store = store(r#"{"System": {"default": {"severity": "Low", "explanation": "{name}: {state}"}}}"#);
        let classifier = SeverityClassifier::new(&store);

        let verdict = classifier.classify(&RawFinding::new("System", "Windows Defender", "⚠️ DISABLED"));
        assert_eq!(verdict.severity, Severity::High);
        assert_eq!(verdict.explanation, "System item 'Windows Defender': ⚠️ DISABLED");

        let verdict = classifier.classify(&RawFinding::new("System", "Hostname", "DESKTOP-01"));
        assert_eq!(verdict.decision, Decision::ModuleDefault);
        assert_eq!(verdict.explanation, "Hostname: DESKTOP-01");
    }

    #[test]
    fn test_default_without_explanation_uses_generic_text() {
        let store = store(r#"{"Startup": {"default": {"severity": "medium"}}}"#);
        let verdict = SeverityClassifier::new(&store).classify(&RawFinding::new("Startup", "OneDrive", "Enabled"));

        assert_eq!(verdict.severity, Severity::Medium);
        assert_eq!(verdict.explanation, "Startup item OneDrive status: Enabled");
    }

    #[test]
    fn test_unknown_module_falls_back_to_low() {
        let store = store("{}");
        let verdict = SeverityClassifier::new(&store).classify(&RawFinding::new("Custom", "thing", "ok"));

        assert_eq!(verdict.severity, Severity::Low);
        assert_eq!(verdict.decision, Decision::Fallback);
        assert_eq!(verdict.explanation, "Custom item thing status: ok");
    }

    #[test]
    fn test_unresolved_placeholders_stay_literal() {
        let store = store(r#"{"Tasks": {"r": {"match": {"stateIn": ["Ready"]}, "severity": "Low", "explanation": "{name} {owner}"}}}"#);
        let verdict = SeverityClassifier::new(&store).classify(&RawFinding::new("Tasks", "T1", "Ready"));

        assert_eq!(verdict.explanation, "T1 {owner}");
    }
}
