// sentinel-core/src/rules/mod.rs
// Immutable rule store: per-module severity rules plus the knowledge base

use crate::error::{Result, SentinelError};
use crate::finding::Module;
use crate::heuristics::Heuristics;
use indexmap::IndexMap;
use parking_lot::RwLock;
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod knowledge;
pub mod severity;
pub mod validation;

pub use knowledge::KnowledgeBaseRule;
pub use severity::{
    DayLimit, DefaultRule, MatcherKind, ModuleRuleSet, RuleMatch, SeverityRule, UptimeExplanations,
    UptimeRule, UptimeThresholds,
};

/// Severity rules compiled into the binary, used when no file is configured.
pub const BUILTIN_SEVERITY_RULES: &str = include_str!("../../rules/severity_rules.json");

/// Knowledge base compiled into the binary, used when no file is configured.
pub const BUILTIN_KNOWLEDGE_BASE: &str = include_str!("../../rules/knowledge_base.json");

static NO_RULES: ModuleRuleSet = ModuleRuleSet::EMPTY;

/// Compiled regexes keyed by pattern text and case sensitivity.
#[derive(Debug, Default)]
pub struct RegexCache {
    compiled: HashMap<(String, bool), Regex>,
}

impl RegexCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, pattern: &str, case_insensitive: bool) -> Result<Regex> {
        let key = (pattern.to_string(), case_insensitive);
        if let Some(regex) = self.compiled.get(&key) {
            return Ok(regex.clone());
        }

        let regex = RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|source| SentinelError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
        self.compiled.insert(key, regex.clone());
        Ok(regex)
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

/// Where to read each rule document from. `None` means the built-in copy.
#[derive(Debug, Clone, Default)]
pub struct RuleSources {
    pub severity_rules: Option<PathBuf>,
    pub knowledge_base: Option<PathBuf>,
}

/// Severity rules, knowledge base and precompiled heuristics.
///
/// Built once and never mutated; see [`RuleHandle`] for swapping in a
/// freshly loaded store.
#[derive(Debug)]
pub struct RuleStore {
    modules: IndexMap<String, ModuleRuleSet>,
    knowledge_base: Vec<KnowledgeBaseRule>,
    heuristics: Heuristics,
    uptime: UptimeRule,
}

impl RuleStore {
    pub fn new(
        modules: IndexMap<String, ModuleRuleSet>,
        knowledge_base: Vec<KnowledgeBaseRule>,
        cache: &mut RegexCache,
    ) -> Result<Self> {
        let heuristics = Heuristics::compile(cache)?;
        let uptime = modules
            .get(Module::System.as_str())
            .and_then(|set| set.uptime.clone())
            .unwrap_or_default();

        Ok(Self {
            modules,
            knowledge_base,
            heuristics,
            uptime,
        })
    }

    /// Store with no severity rules and an empty knowledge base.
    pub fn empty() -> Result<Self> {
        Self::new(IndexMap::new(), Vec::new(), &mut RegexCache::new())
    }

    /// Parses both rule documents from JSON text.
    pub fn from_json(severity_rules: &str, knowledge_base: &str) -> Result<Self> {
        let mut cache = RegexCache::new();
        let modules = severity::parse_severity_rules(severity_rules)?;
        let kb = knowledge::parse_knowledge_base(knowledge_base, &mut cache)?;
        Self::new(modules, kb, &mut cache)
    }

    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_SEVERITY_RULES, BUILTIN_KNOWLEDGE_BASE)
    }

    /// Loads both documents, failing on the first unreadable or malformed one.
    pub fn load(sources: &RuleSources) -> Result<Self> {
        let mut cache = RegexCache::new();
        let severity_text = read_source(sources.severity_rules.as_deref(), BUILTIN_SEVERITY_RULES)?;
        let kb_text = read_source(sources.knowledge_base.as_deref(), BUILTIN_KNOWLEDGE_BASE)?;

        let modules = severity::parse_severity_rules(&severity_text)?;
        let kb = knowledge::parse_knowledge_base(&kb_text, &mut cache)?;
        Self::new(modules, kb, &mut cache)
    }

    /// Loads both documents; a document that cannot be read or parsed is
    /// replaced by an empty one and a warning is logged.
    pub fn load_lenient(sources: &RuleSources) -> Result<Self> {
        let mut cache = RegexCache::new();

        let modules = match read_source(sources.severity_rules.as_deref(), BUILTIN_SEVERITY_RULES)
            .and_then(|text| severity::parse_severity_rules(&text))
        {
            Ok(modules) => modules,
            Err(e) => {
                warn!("⚠️  Could not load severity rules, continuing with an empty rule set: {}", e);
                IndexMap::new()
            }
        };

        let kb = match read_source(sources.knowledge_base.as_deref(), BUILTIN_KNOWLEDGE_BASE)
            .and_then(|text| knowledge::parse_knowledge_base(&text, &mut cache))
        {
            Ok(kb) => kb,
            Err(e) => {
                warn!("⚠️  Could not load knowledge base, continuing with severity fallbacks only: {}", e);
                Vec::new()
            }
        };

        let store = Self::new(modules, kb, &mut cache)?;
        info!(
            "Rule store ready: {} modules, {} severity rules, {} knowledge base rules, {} cached patterns",
            store.modules.len(),
            store.severity_rule_count(),
            store.knowledge_base.len(),
            cache.len()
        );
        Ok(store)
    }

    /// Rules for `module`, or an empty set for modules without rules.
    pub fn severity_rules(&self, module: &str) -> &ModuleRuleSet {
        self.modules.get(module).unwrap_or(&NO_RULES)
    }

    pub fn modules(&self) -> impl Iterator<Item = (&str, &ModuleRuleSet)> {
        self.modules.iter().map(|(name, set)| (name.as_str(), set))
    }

    pub fn knowledge_base(&self) -> &[KnowledgeBaseRule] {
        &self.knowledge_base
    }

    pub fn heuristics(&self) -> &Heuristics {
        &self.heuristics
    }

    /// Uptime thresholds from `System.Uptime`, or the defaults.
    pub fn uptime(&self) -> &UptimeRule {
        &self.uptime
    }

    pub fn severity_rule_count(&self) -> usize {
        self.modules.values().map(|set| set.rules.len()).sum()
    }
}

fn read_source(path: Option<&Path>, builtin: &str) -> Result<String> {
    match path {
        Some(path) => {
            debug!("Reading rule source {}", path.display());
            std::fs::read_to_string(path).map_err(|source| SentinelError::RuleSource {
                source_name: path.display().to_string(),
                source,
            })
        }
        None => Ok(builtin.to_string()),
    }
}

/// Shared, swappable reference to the current rule store.
///
/// Readers take an `Arc` snapshot; a reload builds a complete store first and
/// then replaces the pointer, so no reader sees a half-loaded rule set.
#[derive(Debug)]
pub struct RuleHandle {
    current: RwLock<Arc<RuleStore>>,
}

impl RuleHandle {
    pub fn new(store: RuleStore) -> Self {
        Self {
            current: RwLock::new(Arc::new(store)),
        }
    }

    pub fn current(&self) -> Arc<RuleStore> {
        Arc::clone(&self.current.read())
    }

    /// Installs `store` and returns the previous one.
    pub fn replace(&self, store: RuleStore) -> Arc<RuleStore> {
        let mut guard = self.current.write();
        std::mem::replace(&mut *guard, Arc::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_rules_parse() {
        let store = RuleStore::builtin().unwrap();
        assert!(store.severity_rule_count() > 0);
        assert!(!store.knowledge_base().is_empty());
        assert!(!store.severity_rules("Services").rules.is_empty());
    }

    #[test]
    fn test_unknown_module_has_no_rules() {
        let store = RuleStore::builtin().unwrap();
        let set = store.severity_rules("Bluetooth");
        assert!(set.rules.is_empty());
        assert!(set.default.is_none());
    }

    #[test]
    fn test_regex_cache_reuses_patterns() {
        let mut cache = RegexCache::new();
        cache.get("(?:telnet|ftp)", false).unwrap();
        cache.get("(?:telnet|ftp)", false).unwrap();
        cache.get("(?:telnet|ftp)", true).unwrap();
        assert_eq!(cache.len(), 2);

        let err = cache.get("(unclosed", false).unwrap_err();
        assert!(matches!(err, SentinelError::InvalidPattern { .. }));
    }

    #[test]
    fn test_strict_load_reports_missing_file() {
        let sources = RuleSources {
            severity_rules: Some(PathBuf::from("/nonexistent/severity_rules.json")),
            knowledge_base: None,
        };
        let err = RuleStore::load(&sources).unwrap_err();
        assert!(matches!(err, SentinelError::RuleSource { .. }));
        assert_eq!(err.kind(), "rule_source");
        assert!(err.to_string().contains("/nonexistent/severity_rules.json"));
    }

    #[test]
    fn test_lenient_load_substitutes_empty_sources() {
        let mut broken = tempfile::NamedTempFile::new().unwrap();
        writeln!(broken, "{{ not json").unwrap();

        let sources = RuleSources {
            severity_rules: Some(broken.path().to_path_buf()),
            knowledge_base: Some(PathBuf::from("/nonexistent/knowledge_base.json")),
        };
        let store = RuleStore::load_lenient(&sources).unwrap();

        assert_eq!(store.severity_rule_count(), 0);
        assert!(store.knowledge_base().is_empty());
        assert_eq!(store.uptime().thresholds.low.max_days, 7);
    }

    #[test]
    fn test_load_from_files() {
        let mut severity = tempfile::NamedTempFile::new().unwrap();
        write!(
            severity,
            r#"{{"Tasks": {{"disabled": {{"match": {{"stateIn": ["Disabled"]}}, "severity": "Low", "explanation": "{{name}} off"}}}}}}"#
        )
        .unwrap();
        let mut kb = tempfile::NamedTempFile::new().unwrap();
        write!(kb, r#"{{"rules": []}}"#).unwrap();

        let store = RuleStore::load(&RuleSources {
            severity_rules: Some(severity.path().to_path_buf()),
            knowledge_base: Some(kb.path().to_path_buf()),
        })
        .unwrap();

        assert_eq!(store.severity_rule_count(), 1);
        assert_eq!(store.severity_rules("Tasks").rules[0].name, "disabled");
    }

    #[test]
    fn test_handle_swaps_whole_store() {
        let handle = RuleHandle::new(RuleStore::empty().unwrap());
        let before = handle.current();
        assert_eq!(before.severity_rule_count(), 0);

        let previous = handle.replace(RuleStore::builtin().unwrap());
        assert!(Arc::ptr_eq(&previous, &before));
        assert!(handle.current().severity_rule_count() > 0);
        // snapshots taken earlier keep the old rules
        assert_eq!(before.severity_rule_count(), 0);
    }
}
