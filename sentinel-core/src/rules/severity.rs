// sentinel-core/src/rules/severity.rs
// Per-module severity rules and the System/Uptime threshold table

use crate::error::{Result, SentinelError};
use crate::finding::{Module, RawFinding, Severity};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

/// Which matcher of a rule fired, in evaluation priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherKind {
    StateIn,
    StateNot,
    StartMode,
    PathContains,
}

/// Match predicate of a severity rule. Every present matcher is an
/// independent alternative.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleMatch {
    #[serde(default)]
    pub state_in: Option<Vec<String>>,
    #[serde(default)]
    pub state_not: Option<String>,
    /// Only consulted for the Services module
    #[serde(default)]
    pub start_mode: Option<String>,
    /// Lowercased at load time
    #[serde(default)]
    pub path_contains: Option<Vec<String>>,
}

impl RuleMatch {
    pub fn is_empty(&self) -> bool {
        self.state_in.is_none()
            && self.state_not.is_none()
            && self.start_mode.is_none()
            && self.path_contains.is_none()
    }

    fn lowercase_paths(mut self) -> Self {
        if let Some(fragments) = self.path_contains.as_mut() {
            for fragment in fragments.iter_mut() {
                *fragment = fragment.to_lowercase();
            }
        }
        self
    }
}

#[derive(Debug, Clone)]
pub struct SeverityRule {
    pub name: String,
    pub matcher: RuleMatch,
    pub severity: Severity,
    pub explanation: String,
}

impl SeverityRule {
    /// First matcher of this rule satisfied by `finding`, if any.
    pub fn evaluate(&self, finding: &RawFinding) -> Option<MatcherKind> {
        let m = &self.matcher;
        let state = finding.status.as_str();

        if let Some(states) = &m.state_in {
            if states.iter().any(|s| s == state) {
                return Some(MatcherKind::StateIn);
            }
        }

        if let Some(excluded) = &m.state_not {
            if state != excluded {
                return Some(MatcherKind::StateNot);
            }
        }

        if finding.module == Module::Services.as_str() {
            if let Some(mode) = &m.start_mode {
                if *mode == finding.start_mode && state != m.state_not.as_deref().unwrap_or("") {
                    return Some(MatcherKind::StartMode);
                }
            }
        }

        if let Some(fragments) = &m.path_contains {
            let path = finding.path.to_lowercase();
            if fragments.iter().any(|fragment| path.contains(fragment.as_str())) {
                return Some(MatcherKind::PathContains);
            }
        }

        None
    }
}

/// Applied when no rule of the module matches and no warning marker is present.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultRule {
    #[serde(default = "low")]
    pub severity: Severity,
    #[serde(default)]
    pub explanation: Option<String>,
}

fn low() -> Severity {
    Severity::Low
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DayLimit {
    #[serde(rename = "maxDays")]
    pub max_days: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct UptimeThresholds {
    #[serde(default = "UptimeThresholds::default_low")]
    pub low: DayLimit,
    #[serde(default = "UptimeThresholds::default_medium")]
    pub medium: DayLimit,
}

impl UptimeThresholds {
    fn default_low() -> DayLimit {
        DayLimit { max_days: 7 }
    }

    fn default_medium() -> DayLimit {
        DayLimit { max_days: 30 }
    }
}

impl Default for UptimeThresholds {
    fn default() -> Self {
        Self {
            low: Self::default_low(),
            medium: Self::default_medium(),
        }
    }
}

/// Explanation templates per uptime band. Placeholders: `{name}`, `{state}`,
/// `{days}`, `{lowMax}`, `{medMax}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UptimeExplanations {
    pub low: String,
    pub medium: String,
    pub high: String,
}

impl Default for UptimeExplanations {
    fn default() -> Self {
        Self {
            low: "System uptime is {state}, within the normal range of {lowMax} days.".to_string(),
            medium: "System has been up for {state}, longer than {lowMax} days. Consider rebooting to apply pending updates.".to_string(),
            high: "System has been up for {state}, longer than {medMax} days. Long uptimes usually mean missing patches; reboot soon.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UptimeRule {
    #[serde(default)]
    pub thresholds: UptimeThresholds,
    #[serde(default)]
    pub explanations: UptimeExplanations,
}

/// Ordered rules of one module plus its optional default and uptime table.
#[derive(Debug, Clone, Default)]
pub struct ModuleRuleSet {
    pub rules: Vec<SeverityRule>,
    pub default: Option<DefaultRule>,
    pub uptime: Option<UptimeRule>,
}

impl ModuleRuleSet {
    pub const EMPTY: ModuleRuleSet = ModuleRuleSet {
        rules: Vec::new(),
        default: None,
        uptime: None,
    };

    /// First rule (in declared order) with a satisfied matcher.
    pub fn first_match(&self, finding: &RawFinding) -> Option<(&SeverityRule, MatcherKind)> {
        self.rules
            .iter()
            .find_map(|rule| rule.evaluate(finding).map(|kind| (rule, kind)))
    }
}

#[derive(Debug, Deserialize)]
struct RuleSpec {
    #[serde(rename = "match", default)]
    matcher: RuleMatch,
    severity: Severity,
    #[serde(default)]
    explanation: String,
}

const DEFAULT_KEY: &str = "default";
const UPTIME_KEY: &str = "Uptime";

/// Parses `{module: {ruleName: {...}}}` keeping declaration order.
pub fn parse_severity_rules(text: &str) -> Result<IndexMap<String, ModuleRuleSet>> {
    let document: IndexMap<String, IndexMap<String, Value>> =
        serde_json::from_str(text).map_err(|e| SentinelError::rule_parse("severity rules", e))?;

    let mut modules = IndexMap::with_capacity(document.len());
    for (module, entries) in document {
        let mut set = ModuleRuleSet::default();

        for (rule_name, value) in entries {
            let context = format!("severity rule {}.{}", module, rule_name);
            if rule_name == DEFAULT_KEY {
                let default: DefaultRule =
                    serde_json::from_value(value).map_err(|e| SentinelError::rule_parse(&context, e))?;
                set.default = Some(default);
            } else if module == Module::System.as_str() && rule_name == UPTIME_KEY {
                let uptime: UptimeRule =
                    serde_json::from_value(value).map_err(|e| SentinelError::rule_parse(&context, e))?;
                set.uptime = Some(uptime);
            } else {
                let spec: RuleSpec =
                    serde_json::from_value(value).map_err(|e| SentinelError::rule_parse(&context, e))?;
                set.rules.push(SeverityRule {
                    name: rule_name,
                    matcher: spec.matcher.lowercase_paths(),
                    severity: spec.severity,
                    explanation: spec.explanation,
                });
            }
        }

        modules.insert(module, set);
    }

    Ok(modules)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(status: &str, start_mode: &str, path: &str) -> RawFinding {
        RawFinding::new("Services", "Svc", status)
            .with_start_mode(start_mode)
            .with_path(path)
    }

    fn rule(matcher: RuleMatch) -> SeverityRule {
        SeverityRule {
            name: "r".to_string(),
            matcher,
            severity: Severity::Medium,
            explanation: String::new(),
        }
    }

    #[test]
    fn test_matcher_priority() {
        let r = rule(RuleMatch {
            state_in: Some(vec!["Running".to_string()]),
            state_not: Some("Stopped".to_string()),
            start_mode: Some("Auto".to_string()),
            path_contains: Some(vec!["svc".to_string()]),
        });

        assert_eq!(r.evaluate(&service("Running", "Auto", "c:\\svc.exe")), Some(MatcherKind::StateIn));
        assert_eq!(r.evaluate(&service("Paused", "Auto", "c:\\svc.exe")), Some(MatcherKind::StateNot));
        assert_eq!(r.evaluate(&service("Stopped", "Auto", "c:\\svc.exe")), Some(MatcherKind::PathContains));
        assert_eq!(r.evaluate(&service("Stopped", "Manual", "c:\\other.exe")), None);
    }

    #[test]
    fn test_start_mode_wins_over_path() {
        let r = rule(RuleMatch {
            start_mode: Some("Auto".to_string()),
            path_contains: Some(vec!["svc".to_string()]),
            ..RuleMatch::default()
        });

        assert_eq!(r.evaluate(&service("Running", "Auto", "c:\\svc.exe")), Some(MatcherKind::StartMode));
        assert_eq!(r.evaluate(&service("Running", "Manual", "c:\\svc.exe")), Some(MatcherKind::PathContains));
    }

    #[test]
    fn test_start_mode_only_for_services() {
        let r = rule(RuleMatch {
            start_mode: Some("Auto".to_string()),
            ..RuleMatch::default()
        });

        assert_eq!(r.evaluate(&service("Stopped", "Auto", "")), Some(MatcherKind::StartMode));
        // empty state never satisfies the implicit inequality
        assert_eq!(r.evaluate(&service("", "Auto", "")), None);

        let task = RawFinding::new("Tasks", "T", "Ready").with_start_mode("Auto");
        assert_eq!(r.evaluate(&task), None);
    }

    #[test]
    fn test_path_contains_is_case_insensitive() {
        let set = parse_severity_rules(
            r#"{"Services": {"telnet": {"match": {"pathContains": ["TELNET"]}, "severity": "high"}}}"#,
        )
        .unwrap();
        let finding = service("Running", "Auto", "C:\\Windows\\System32\\Telnet.exe");
        let (rule, kind) = set["Services"].first_match(&finding).unwrap();

        assert_eq!(rule.severity, Severity::High);
        assert_eq!(kind, MatcherKind::PathContains);
    }

    #[test]
    fn test_declared_order_is_kept() {
        let set = parse_severity_rules(
            r#"{"Tasks": {
                "zeta": {"match": {"stateIn": ["Ready"]}, "severity": "Low"},
                "alpha": {"match": {"stateIn": ["Ready"]}, "severity": "High"},
                "default": {"severity": "Medium", "explanation": "{name}"}
            }}"#,
        )
        .unwrap();
        let tasks = &set["Tasks"];

        assert_eq!(tasks.rules.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), ["zeta", "alpha"]);
        assert_eq!(tasks.default.as_ref().unwrap().severity, Severity::Medium);

        let finding = RawFinding::new("Tasks", "Updater", "Ready");
        assert_eq!(tasks.first_match(&finding).unwrap().0.name, "zeta");
    }

    #[test]
    fn test_uptime_table() {
        let set = parse_severity_rules(
            r#"{"System": {"Uptime": {"thresholds": {"low": {"maxDays": 3}}, "explanations": {"low": "ok {state}"}}}}"#,
        )
        .unwrap();
        let uptime = set["System"].uptime.as_ref().unwrap();

        assert_eq!(uptime.thresholds.low.max_days, 3);
        assert_eq!(uptime.thresholds.medium.max_days, 30);
        assert_eq!(uptime.explanations.low, "ok {state}");
        assert!(uptime.explanations.high.contains("{medMax}"));
        assert!(set["System"].rules.is_empty());
    }

    #[test]
    fn test_invalid_severity_is_a_parse_error() {
        let err = parse_severity_rules(
            r#"{"Tasks": {"x": {"match": {"stateIn": ["Ready"]}, "severity": "Critical"}}}"#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("Tasks.x"));
    }
}
