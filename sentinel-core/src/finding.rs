// sentinel-core/src/finding.rs
// Finding structures shared between collectors, the engine and exporters

use chrono::{DateTime, Local};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ordinal risk grade. `High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Low, Severity::Medium, Severity::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
        }
    }

    /// Display rank: High first, then Medium, then Low.
    pub fn display_rank(severity: Option<Severity>) -> u8 {
        match severity {
            Some(Severity::High) => 0,
            Some(Severity::Medium) => 1,
            Some(Severity::Low) => 2,
            None => 3,
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Severity::High => "🔴",
            Severity::Medium => "🟡",
            Severity::Low => "🟢",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

// Rule files are hand-edited, so accept any casing.
impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Collector categories known to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Module {
    Services,
    Tasks,
    Wmi,
    Startup,
    System,
    Network,
    Process,
    Registry,
}

impl Module {
    pub const ALL: [Module; 8] = [
        Module::Services,
        Module::Tasks,
        Module::Wmi,
        Module::Startup,
        Module::System,
        Module::Network,
        Module::Process,
        Module::Registry,
    ];

    /// Module id as it appears in findings and rule files
    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Services => "Services",
            Module::Tasks => "Tasks",
            Module::Wmi => "WMI",
            Module::Startup => "Startup",
            Module::System => "System",
            Module::Network => "Network",
            Module::Process => "Process",
            Module::Registry => "Registry",
        }
    }

    pub fn is_known(id: &str) -> bool {
        Module::ALL.iter().any(|m| m.as_str() == id)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Module {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Module::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().to_ascii_lowercase() == wanted)
            .ok_or_else(|| format!("unknown module '{}'", s))
    }
}

/// One observation produced by a collector, before classification.
///
/// Optional collector fields are normalized to empty strings; `risk_score`
/// defaults to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFinding {
    pub module: String,
    pub name: String,
    /// Free-form status, also used as the "state" by severity rules
    pub status: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub start_mode: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub risk_score: u32,
    pub timestamp: DateTime<Local>,
}

impl RawFinding {
    pub fn new(module: impl Into<String>, name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            status: status.into(),
            path: String::new(),
            start_mode: String::new(),
            user: String::new(),
            risk_score: 0,
            timestamp: Local::now(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_start_mode(mut self, start_mode: impl Into<String>) -> Self {
        self.start_mode = start_mode.into();
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_risk_score(mut self, risk_score: u32) -> Self {
        self.risk_score = risk_score;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Local>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl fmt::Display for RawFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.module, self.name, self.status)?;
        if !self.path.is_empty() {
            write!(f, " -> {}", self.path)?;
        }
        Ok(())
    }
}

/// A finding with its verdict attached. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedFinding {
    finding: RawFinding,
    severity: Severity,
    explanation: String,
    recommendation: String,
}

impl ClassifiedFinding {
    pub fn new(
        finding: RawFinding,
        severity: Severity,
        explanation: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        Self {
            finding,
            severity,
            explanation: explanation.into(),
            recommendation: recommendation.into(),
        }
    }

    pub fn finding(&self) -> &RawFinding {
        &self.finding
    }

    pub fn module(&self) -> &str {
        &self.finding.module
    }

    pub fn name(&self) -> &str {
        &self.finding.name
    }

    pub fn status(&self) -> &str {
        &self.finding.status
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    pub fn recommendation(&self) -> &str {
        &self.recommendation
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.finding.timestamp
    }

    /// Builds a new finding carrying replacement texts; the original is untouched.
    pub fn with_texts(&self, explanation: impl Into<String>, recommendation: impl Into<String>) -> Self {
        Self::new(self.finding.clone(), self.severity, explanation, recommendation)
    }

    /// Equality over everything but the timestamp.
    pub fn same_verdict(&self, other: &ClassifiedFinding) -> bool {
        self.severity == other.severity
            && self.explanation == other.explanation
            && self.recommendation == other.recommendation
            && self.finding.module == other.finding.module
            && self.finding.name == other.finding.name
            && self.finding.status == other.finding.status
            && self.finding.path == other.finding.path
    }
}

impl fmt::Display for ClassifiedFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:<6} {} - {}",
            self.severity.icon(),
            self.severity,
            self.finding,
            self.explanation
        )
    }
}
