// sentinel-core/src/rules/knowledge.rs
// Knowledge base: ordered recommendation rules with parameterized templates

use super::RegexCache;
use crate::error::{Result, SentinelError};
use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

/// One knowledge-base entry. Filters that are absent always pass.
#[derive(Debug, Clone)]
pub struct KnowledgeBaseRule {
    pub id: String,
    pub module: Option<String>,
    /// Case-sensitive search over the finding name
    pub name_pattern: Option<Regex>,
    /// Case-insensitive search over the explanation
    pub explanation_pattern: Option<Regex>,
    pub parameters: IndexMap<String, String>,
    pub explanation_template: String,
    pub recommendation_template: String,
}

impl KnowledgeBaseRule {
    pub fn matches(&self, module: &str, name: &str, explanation: &str) -> bool {
        if let Some(wanted) = &self.module {
            if wanted != module {
                return false;
            }
        }
        if let Some(pattern) = &self.name_pattern {
            if !pattern.is_match(name) {
                return false;
            }
        }
        if let Some(pattern) = &self.explanation_pattern {
            if !pattern.is_match(explanation) {
                return false;
            }
        }
        true
    }

    /// False when the rule matches every finding.
    pub fn has_filters(&self) -> bool {
        self.module.is_some() || self.name_pattern.is_some() || self.explanation_pattern.is_some()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum KbDocument {
    Wrapped { rules: Vec<KbRuleSpec> },
    Bare(Vec<KbRuleSpec>),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KbMatchSpec {
    #[serde(default)]
    module: Option<String>,
    #[serde(default)]
    name_pattern: Option<String>,
    #[serde(default)]
    explanation_pattern: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct KbTemplateSpec {
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    recommendation: String,
}

#[derive(Debug, Deserialize)]
struct KbRuleSpec {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "match", default)]
    matcher: KbMatchSpec,
    #[serde(default)]
    parameters: IndexMap<String, Value>,
    #[serde(default)]
    templates: KbTemplateSpec,
}

/// Parses the knowledge base, accepting either `{"rules": [...]}` or a bare array.
pub fn parse_knowledge_base(text: &str, cache: &mut RegexCache) -> Result<Vec<KnowledgeBaseRule>> {
    let document: KbDocument =
        serde_json::from_str(text).map_err(|e| SentinelError::rule_parse("knowledge base", e))?;
    let specs = match document {
        KbDocument::Wrapped { rules } => rules,
        KbDocument::Bare(rules) => rules,
    };

    specs
        .into_iter()
        .enumerate()
        .map(|(index, spec)| compile_rule(index, spec, cache))
        .collect()
}

fn compile_rule(index: usize, spec: KbRuleSpec, cache: &mut RegexCache) -> Result<KnowledgeBaseRule> {
    let name_pattern = non_empty(spec.matcher.name_pattern)
        .map(|p| cache.get(&p, false))
        .transpose()?;
    let explanation_pattern = non_empty(spec.matcher.explanation_pattern)
        .map(|p| cache.get(&p, true))
        .transpose()?;

    let parameters = spec
        .parameters
        .into_iter()
        .map(|(key, value)| (key, stringify(value)))
        .collect();

    Ok(KnowledgeBaseRule {
        id: spec.id.unwrap_or_else(|| format!("kb-{}", index + 1)),
        module: non_empty(spec.matcher.module),
        name_pattern,
        explanation_pattern,
        parameters,
        explanation_template: spec.templates.explanation,
        recommendation_template: spec.templates.recommendation,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn stringify(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        other => serde_json::to_string(&other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Vec<KnowledgeBaseRule> {
        parse_knowledge_base(text, &mut RegexCache::new()).unwrap()
    }

    #[test]
    fn test_filters_are_conjunctive() {
        let rules = parse(
            r#"{"rules": [{"match": {"module": "Services", "namePattern": "^Tel", "explanationPattern": "remote"},
                          "templates": {"explanation": "e", "recommendation": "r"}}]}"#,
        );
        let rule = &rules[0];

        assert!(rule.matches("Services", "Telnet", "Allows REMOTE shell"));
        assert!(!rule.matches("Tasks", "Telnet", "remote"));
        assert!(!rule.matches("Services", "telnet", "remote"));
        assert!(!rule.matches("Services", "Telnet", "local only"));
    }

    #[test]
    fn test_empty_filters_count_as_absent() {
        let rules = parse(r#"[{"match": {"module": "", "namePattern": ""}, "templates": {"recommendation": "x"}}]"#);

        assert!(!rules[0].has_filters());
        assert!(rules[0].matches("Anything", "at all", ""));
        assert_eq!(rules[0].id, "kb-1");
        assert_eq!(rules[0].explanation_template, "");
    }

    #[test]
    fn test_parameters_are_stringified_in_order() {
        let rules = parse(
            r#"{"rules": [{"id": "p", "parameters": {"port": 23, "b": true, "n": null, "list": [1, 2], "s": "txt"}}]}"#,
        );
        let params: Vec<(&str, &str)> = rules[0]
            .parameters
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        assert_eq!(
            params,
            [("port", "23"), ("b", "true"), ("n", ""), ("list", "[1,2]"), ("s", "txt")]
        );
    }

    #[test]
    fn test_bad_pattern_is_rejected() {
        let err = parse_knowledge_base(r#"[{"match": {"namePattern": "(["}}]"#, &mut RegexCache::new()).unwrap_err();
        assert!(matches!(err, SentinelError::InvalidPattern { .. }));
    }
}
