// sentinel-scan/src/config.rs
// Configuration management

use anyhow::{Context, Result};
use sentinel_core::{PipelineConfig, RuleSources, Severity};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "SENTINEL";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scan: ScanConfig,
    pub rules: RulesConfig,
    pub explainer: ExplainerConfig,
    pub logging: LoggingConfig,
    pub collectors: CollectorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Module ids or `all`
    pub modules: Vec<String>,
    pub output_dir: PathBuf,
    pub collector_timeout_secs: u64,
    /// 0 picks one worker per CPU
    pub workers: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            modules: vec!["all".to_string()],
            output_dir: PathBuf::from("exported_logs"),
            collector_timeout_secs: 60,
            workers: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub severity_rules: Option<PathBuf>,
    pub knowledge_base: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainerConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
    pub min_severity: Severity,
    /// Environment variable checked before the stored credentials file
    pub api_key_env: String,
}

impl Default for ExplainerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 20,
            min_severity: Severity::High,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorsConfig {
    pub external: Vec<ExternalCollectorConfig>,
}

/// A command that prints a JSON array of finding records on stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalCollectorConfig {
    pub module: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Config {
    /// Layers the TOML file (if any) and `SENTINEL__SECTION__KEY` variables
    /// over the defaults. An explicitly requested file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (file, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let layered = config::Config::builder()
            .add_source(
                config::File::from(file.as_path())
                    .format(config::FileFormat::Toml)
                    .required(required),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to load configuration from {}", file.display()))?;

        layered
            .try_deserialize()
            .with_context(|| format!("Invalid configuration in {}", file.display()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration as TOML")
    }

    pub fn rule_sources(&self) -> RuleSources {
        RuleSources {
            severity_rules: self.rules.severity_rules.clone(),
            knowledge_base: self.rules.knowledge_base.clone(),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let defaults = PipelineConfig::default();
        PipelineConfig {
            collector_timeout: Duration::from_secs(self.scan.collector_timeout_secs.max(1)),
            workers: if self.scan.workers == 0 { defaults.workers } else { self.scan.workers },
            explain_min_severity: self.explainer.min_severity,
            explain_timeout: Duration::from_secs(self.explainer.timeout_secs.max(1)),
        }
    }
}

const CREDENTIALS_DIR: &str = ".sentinel-grade";
const CREDENTIALS_FILE: &str = "credentials.toml";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Credentials {
    #[serde(default)]
    api_key: String,
}

/// Per-user API key file, `~/.sentinel-grade/credentials.toml` by default.
#[derive(Debug, Clone)]
pub struct ApiKeyStore {
    path: PathBuf,
}

impl ApiKeyStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn in_home() -> Option<Self> {
        dirs::home_dir().map(|home| Self::new(home.join(CREDENTIALS_DIR).join(CREDENTIALS_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored key, or an empty string when there is none or it cannot be read.
    pub fn load_key(&self) -> String {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|text| toml::from_str::<Credentials>(&text).ok())
            .map(|credentials| credentials.api_key)
            .unwrap_or_default()
    }

    pub fn save_key(&self, key: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let text = toml::to_string(&Credentials {
            api_key: key.trim().to_string(),
        })?;
        std::fs::write(&self.path, text).with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

/// Environment variable first, then the stored key. `None` when neither is set.
pub fn resolve_api_key(explainer: &ExplainerConfig, store: Option<&ApiKeyStore>) -> Option<String> {
    std::env::var(&explainer.api_key_env)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .or_else(|| store.map(ApiKeyStore::load_key).filter(|key| !key.is_empty()))
}
