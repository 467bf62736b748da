// sentinel-core/src/recommender.rs
// Knowledge-base driven remediation advice with severity fallbacks

use crate::finding::{RawFinding, Severity};
use crate::rules::{KnowledgeBaseRule, RuleStore};
use crate::template::render_strict;
use std::collections::HashMap;
use tracing::debug;

pub const HIGH_RECOMMENDATION: &str = "Disable or investigate immediately";
pub const MEDIUM_RECOMMENDATION: &str = "Research further and monitor closely";
pub const LOW_RECOMMENDATION: &str = "No action needed unless new issues appear";
pub const UNKNOWN_RECOMMENDATION: &str = "Manual review recommended";
pub const NO_EXPLANATION: &str = "No explanation provided.";

/// Output of the recommender. `matched_rule` is the knowledge-base rule id,
/// `None` when the severity fallback was used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advice {
    pub explanation: String,
    pub recommendation: String,
    pub matched_rule: Option<String>,
}

/// Canned advice keyed only by severity.
pub fn fallback_recommendation(severity: Option<Severity>) -> &'static str {
    match severity {
        Some(Severity::High) => HIGH_RECOMMENDATION,
        Some(Severity::Medium) => MEDIUM_RECOMMENDATION,
        Some(Severity::Low) => LOW_RECOMMENDATION,
        None => UNKNOWN_RECOMMENDATION,
    }
}

pub struct Recommender<'a> {
    rules: &'a RuleStore,
}

impl<'a> Recommender<'a> {
    pub fn new(rules: &'a RuleStore) -> Self {
        Self { rules }
    }

    pub fn recommend(&self, finding: &RawFinding, severity: Option<Severity>, explanation: &str) -> Advice {
        let matched = self
            .rules
            .knowledge_base()
            .iter()
            .find(|rule| rule.matches(&finding.module, &finding.name, explanation));

        match matched {
            Some(rule) => apply_rule(rule, finding),
            None => Advice {
                explanation: if explanation.is_empty() {
                    NO_EXPLANATION.to_string()
                } else {
                    explanation.to_string()
                },
                recommendation: fallback_recommendation(severity).to_string(),
                matched_rule: None,
            },
        }
    }
}

fn apply_rule(rule: &KnowledgeBaseRule, finding: &RawFinding) -> Advice {
    let mut params: HashMap<String, String> = HashMap::with_capacity(rule.parameters.len() + 2);
    params.insert("value".to_string(), finding.status.clone());
    params.insert("name".to_string(), finding.name.clone());
    // rule parameters override the built-ins
    for (key, value) in &rule.parameters {
        params.insert(key.clone(), value.clone());
    }

    let render = |template: &str| match render_strict(template, &params) {
        Ok(text) => text,
        Err(missing) => {
            debug!("Knowledge base rule '{}': {}, keeping template text", rule.id, missing);
            template.to_string()
        }
    };

    Advice {
        explanation: render(&rule.explanation_template),
        recommendation: render(&rule.recommendation_template),
        matched_rule: Some(rule.id.clone()),
    }
}
