// sentinel-core/src/heuristics.rs
// Module-independent checks applied before any module rule

use crate::classifier::{Decision, Verdict};
use crate::error::Result;
use crate::finding::{Module, RawFinding, Severity};
use crate::rules::{RegexCache, RuleStore};
use crate::template::render_lenient;
use regex::Regex;

/// Path fragments, matched against the lowercased path.
pub const SUSPICIOUS_PATHS: &[&str] = &[
    r"\\temp\\",
    r"\\tmp\\",
    r"\\appdata\\local\\temp",
    r"\\downloads\\",
    r"\\public\\",
    r"\\users\\public",
];

/// Command patterns, matched against the lowercased `"{path} {status}"`.
pub const SUSPICIOUS_COMMANDS: &[&str] = &[
    r"powershell.*-enc",
    r"powershell.*bypass",
    r"cmd\s*/c",
    r"wscript",
    r"cscript",
    r"mshta",
    r"regsvr32.*scrobj",
    r"certutil.*-urlcache",
    r"bitsadmin.*/transfer",
];

pub const HIGH_RISK_SCORE: u32 = 40;
pub const MEDIUM_RISK_SCORE: u32 = 20;

const UPTIME_NAME: &str = "Uptime";

#[derive(Debug, Clone)]
pub struct Heuristics {
    paths: Vec<Regex>,
    commands: Vec<Regex>,
}

impl Heuristics {
    pub fn compile(cache: &mut RegexCache) -> Result<Self> {
        let paths = SUSPICIOUS_PATHS
            .iter()
            .map(|p| cache.get(p, false))
            .collect::<Result<Vec<_>>>()?;
        let commands = SUSPICIOUS_COMMANDS
            .iter()
            .map(|p| cache.get(p, false))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { paths, commands })
    }

    pub fn suspicious_path(&self, path: &str) -> bool {
        if path.is_empty() {
            return false;
        }
        let lowered = path.to_lowercase();
        self.paths.iter().any(|re| re.is_match(&lowered))
    }

    pub fn suspicious_command(&self, path: &str, status: &str) -> bool {
        let combined = format!("{} {}", path, status).to_lowercase();
        self.commands.iter().any(|re| re.is_match(&combined))
    }
}

/// Leading day count of an uptime status such as `"12 days, 3 hours"`; 0 if absent.
pub fn parse_uptime_days(status: &str) -> i64 {
    status
        .split(" days")
        .next()
        .map(str::trim)
        .and_then(|days| days.parse::<i64>().ok())
        .unwrap_or(0)
}

/// Stage one of classification. `None` means "continue with module rules".
pub fn preclassify(store: &RuleStore, finding: &RawFinding) -> Option<Verdict> {
    let score = finding.risk_score;
    if score >= HIGH_RISK_SCORE {
        return Some(Verdict::new(
            Severity::High,
            format!("High-risk item detected: {}", finding.status),
            Decision::RiskScore,
        ));
    }
    if score >= MEDIUM_RISK_SCORE {
        return Some(Verdict::new(
            Severity::Medium,
            format!("Medium-risk item: {}", finding.status),
            Decision::RiskScore,
        ));
    }

    if finding.module == Module::System.as_str() && finding.name == UPTIME_NAME {
        return Some(classify_uptime(store, finding));
    }

    let heuristics = store.heuristics();
    if heuristics.suspicious_path(&finding.path) {
        return Some(Verdict::new(
            Severity::High,
            format!(
                "{} item '{}' runs from suspicious location: {}",
                finding.module, finding.name, finding.path
            ),
            Decision::SuspiciousPath,
        ));
    }

    if heuristics.suspicious_command(&finding.path, &finding.status) {
        return Some(Verdict::new(
            Severity::High,
            format!("{} item '{}' uses suspicious command pattern.", finding.module, finding.name),
            Decision::SuspiciousCommand,
        ));
    }

    None
}

fn classify_uptime(store: &RuleStore, finding: &RawFinding) -> Verdict {
    let rule = store.uptime();
    let days = parse_uptime_days(&finding.status);
    let low_max = rule.thresholds.low.max_days;
    let medium_max = rule.thresholds.medium.max_days;

    let (severity, template) = if days <= low_max {
        (Severity::Low, &rule.explanations.low)
    } else if days <= medium_max {
        (Severity::Medium, &rule.explanations.medium)
    } else {
        (Severity::High, &rule.explanations.high)
    };

    let days_text = days.to_string();
    let low_text = low_max.to_string();
    let medium_text = medium_max.to_string();
    let params = [
        ("state", finding.status.as_str()),
        ("name", finding.name.as_str()),
        ("path", finding.path.as_str()),
        ("days", days_text.as_str()),
        ("lowMax", low_text.as_str()),
        ("medMax", medium_text.as_str()),
    ];

    Verdict::new(severity, render_lenient(template, &params), Decision::Uptime)
}
