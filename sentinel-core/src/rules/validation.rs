// sentinel-core/src/rules/validation.rs
// Static checks over a loaded rule store

use super::RuleStore;
use crate::finding::Module;
use std::fmt;
use tracing::{info, warn};

/// Validation severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationSeverity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for ValidationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ValidationSeverity::Info => "INFO",
            ValidationSeverity::Warning => "WARN",
            ValidationSeverity::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// A single check; `check` returns one message per offending rule.
#[derive(Debug, Clone)]
pub struct ValidationRule {
    pub name: &'static str,
    pub description: &'static str,
    pub check: fn(&RuleStore) -> Vec<String>,
    pub severity: ValidationSeverity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub rule_name: &'static str,
    pub severity: ValidationSeverity,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.rule_name, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// No issue at `Error` level.
    pub fn is_valid(&self) -> bool {
        self.issues.iter().all(|i| i.severity < ValidationSeverity::Error)
    }

    pub fn count(&self, severity: ValidationSeverity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }
}

pub struct RuleValidator {
    rules: Vec<ValidationRule>,
}

impl Default for RuleValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleValidator {
    pub fn new() -> Self {
        Self {
            rules: Self::create_validation_rules(),
        }
    }

    pub fn validate(&self, store: &RuleStore) -> ValidationReport {
        let mut report = ValidationReport::default();

        for rule in &self.rules {
            for message in (rule.check)(store) {
                if rule.severity >= ValidationSeverity::Warning {
                    warn!("Rule validation [{}]: {}", rule.name, message);
                }
                report.issues.push(ValidationIssue {
                    rule_name: rule.name,
                    severity: rule.severity,
                    message,
                });
            }
        }

        info!(
            "Validated rule store with {} checks: {} errors, {} warnings, {} notes",
            self.rules.len(),
            report.count(ValidationSeverity::Error),
            report.count(ValidationSeverity::Warning),
            report.count(ValidationSeverity::Info)
        );
        report
    }

    fn create_validation_rules() -> Vec<ValidationRule> {
        vec![
            ValidationRule {
                name: "uptime_threshold_order",
                description: "Uptime low.maxDays must not exceed medium.maxDays",
                check: |store| {
                    let thresholds = store.uptime().thresholds;
                    if thresholds.low.max_days > thresholds.medium.max_days {
                        vec![format!(
                            "System.Uptime low.maxDays ({}) is greater than medium.maxDays ({}); the Medium band is empty",
                            thresholds.low.max_days, thresholds.medium.max_days
                        )]
                    } else {
                        Vec::new()
                    }
                },
                severity: ValidationSeverity::Error,
            },
            ValidationRule {
                name: "start_mode_outside_services",
                description: "startMode matchers only apply to the Services module",
                check: |store| {
                    store
                        .modules()
                        .filter(|(module, _)| *module != Module::Services.as_str())
                        .flat_map(|(module, set)| {
                            set.rules
                                .iter()
                                .filter(|r| r.matcher.start_mode.is_some())
                                .map(move |r| format!("{}.{} uses startMode, which never fires outside Services", module, r.name))
                        })
                        .collect()
                },
                severity: ValidationSeverity::Warning,
            },
            ValidationRule {
                name: "empty_match",
                description: "A rule without matchers never fires",
                check: |store| {
                    store
                        .modules()
                        .flat_map(|(module, set)| {
                            set.rules
                                .iter()
                                .filter(|r| r.matcher.is_empty())
                                .map(move |r| format!("{}.{} has an empty match block", module, r.name))
                        })
                        .collect()
                },
                severity: ValidationSeverity::Warning,
            },
            ValidationRule {
                name: "unknown_module",
                description: "Rule modules should name a known collector",
                check: |store| {
                    store
                        .modules()
                        .filter(|(module, _)| !Module::is_known(module))
                        .map(|(module, _)| format!("'{}' is not a known module; its rules only apply to external collectors", module))
                        .collect()
                },
                severity: ValidationSeverity::Info,
            },
            ValidationRule {
                name: "kb_catch_all",
                description: "A knowledge-base rule without filters matches every finding",
                check: |store| {
                    store
                        .knowledge_base()
                        .iter()
                        .filter(|r| !r.has_filters())
                        .map(|r| format!("knowledge base rule '{}' has no filters and matches everything", r.id))
                        .collect()
                },
                severity: ValidationSeverity::Info,
            },
            ValidationRule {
                name: "kb_unreachable",
                description: "Knowledge-base rules after a catch-all are never consulted",
                check: |store| {
                    let kb = store.knowledge_base();
                    match kb.iter().position(|r| !r.has_filters()) {
                        Some(idx) => kb[idx + 1..]
                            .iter()
                            .map(|r| format!("knowledge base rule '{}' is shadowed by catch-all '{}'", r.id, kb[idx].id))
                            .collect(),
                        None => Vec::new(),
                    }
                },
                severity: ValidationSeverity::Warning,
            },
            ValidationRule {
                name: "kb_empty_recommendation",
                description: "A matching knowledge-base rule replaces the recommendation with its template",
                check: |store| {
                    store
                        .knowledge_base()
                        .iter()
                        .filter(|r| r.recommendation_template.trim().is_empty())
                        .map(|r| format!("knowledge base rule '{}' has no recommendation template; matches get an empty recommendation", r.id))
                        .collect()
                },
                severity: ValidationSeverity::Warning,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_rules_are_valid() {
        let store = RuleStore::builtin().unwrap();
        let report = RuleValidator::new().validate(&store);

        assert!(report.is_valid(), "{:?}", report.issues);
        assert_eq!(report.count(ValidationSeverity::Warning), 0);
    }

    #[test]
    fn test_inverted_uptime_thresholds() {
        let store = RuleStore::from_json(
            r#"{"System": {"Uptime": {"thresholds": {"low": {"maxDays": 40}, "medium": {"maxDays": 10}}}}}"#,
            "[]",
        )
        .unwrap();
        let report = RuleValidator::new().validate(&store);

        assert!(!report.is_valid());
        assert_eq!(report.issues[0].rule_name, "uptime_threshold_order");
    }

    #[test]
    fn test_dead_rules_are_reported() {
        let store = RuleStore::from_json(
            r#"{
                "Tasks": {"auto": {"match": {"startMode": "Auto"}, "severity": "High"},
                          "nothing": {"match": {}, "severity": "Low"}},
                "Custom": {"x": {"match": {"stateIn": ["On"]}, "severity": "Low"}}
            }"#,
            r#"[{"id": "all", "templates": {"recommendation": "r"}},
                {"id": "late", "match": {"module": "Tasks"}}]"#,
        )
        .unwrap();
        let report = RuleValidator::new().validate(&store);
        let names: Vec<&str> = report.issues.iter().map(|i| i.rule_name).collect();

        assert!(report.is_valid());
        assert_eq!(
            names,
            [
                "start_mode_outside_services",
                "empty_match",
                "unknown_module",
                "kb_catch_all",
                "kb_unreachable",
                "kb_empty_recommendation"
            ]
        );
        assert!(report.issues[4].message.contains("'late'"));
        assert!(report.issues[5].message.contains("'late'"));
    }

    #[test]
    fn test_kb_rule_without_recommendation() {
        let store = RuleStore::from_json("{}", r#"[{"match": {"module": "Tasks"}}]"#).unwrap();
        let report = RuleValidator::new().validate(&store);

        assert!(report.is_valid());
        assert_eq!(report.count(ValidationSeverity::Warning), 1);
        assert_eq!(report.issues[0].rule_name, "kb_empty_recommendation");
        assert!(report.issues[0].message.contains("'kb-1'"));
    }
}
