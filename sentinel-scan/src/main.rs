// sentinel-scan/src/main.rs
// SentinelGrade - host persistence scanner with explainable risk grades

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Arg, ArgAction, ArgMatches, Command};
use sentinel_core::{
    CollectorOutcome, FindingFilter, Pipeline, RuleHandle, RuleStore, RuleValidator, ScanReport, Severity, ValidationSeverity,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod collectors;
mod config;
mod explainer;
mod export;

use collectors::{ModuleSelection, MODULE_CHOICES};
use config::{resolve_api_key, ApiKeyStore, Config, DEFAULT_CONFIG_FILE};
use explainer::RemoteExplainer;
use export::Exporter;

fn cli() -> Command {
    Command::new("sentinel-scan")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Scans Windows persistence locations and grades every finding Low, Medium or High")
        .arg(
            Arg::new("module")
                .short('m')
                .long("module")
                .help("Module to scan (repeatable)")
                .value_parser(MODULE_CHOICES.to_vec())
                .ignore_case(true)
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .help("Directory for exported CSV files")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path (default: config.toml if present)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("severity")
                .long("severity")
                .help("Only show findings of this severity")
                .value_parser(["low", "medium", "high"])
                .ignore_case(true),
        )
        .arg(
            Arg::new("filter-module")
                .long("filter-module")
                .value_name("MODULE")
                .help("Only show findings from this module"),
        )
        .arg(
            Arg::new("rules")
                .long("rules")
                .value_name("FILE")
                .help("Severity rules JSON file")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("knowledge-base")
                .long("knowledge-base")
                .value_name("FILE")
                .help("Knowledge base JSON file")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("remote-explain")
                .long("remote-explain")
                .help("Ask the remote explanation service about high-severity findings")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("validate-rules")
                .long("validate-rules")
                .help("Check the rule files and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("print-config")
                .long("print-config")
                .help("Print the effective configuration and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("set-api-key")
                .long("set-api-key")
                .value_name("KEY")
                .help("Store the API key for the remote explanation service and exit"),
        )
        .arg(
            Arg::new("no-export")
                .long("no-export")
                .help("Skip CSV export")
                .action(ArgAction::SetTrue),
        )
}

/// Blocking collectors that outlived their timeout are abandoned at exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

fn main() -> Result<ExitCode> {
    let matches = cli().get_matches();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    let code = runtime.block_on(run(matches));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    code
}

async fn run(matches: ArgMatches) -> Result<ExitCode> {
    let config_path = matches.get_one::<PathBuf>("config");
    let mut config = Config::load(config_path.map(PathBuf::as_path))?;
    apply_overrides(&mut config, &matches);
    init_logging(&config.logging.level);
    if config_path.is_none() && !Path::new(DEFAULT_CONFIG_FILE).exists() {
        debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
    }

    if let Some(key) = matches.get_one::<String>("set-api-key") {
        let store = ApiKeyStore::in_home().context("Could not determine the home directory")?;
        store.save_key(key)?;
        println!("🔑 API key saved to {}", store.path().display());
        return Ok(ExitCode::SUCCESS);
    }

    if matches.get_flag("print-config") {
        print!("{}", config.to_toml()?);
        return Ok(ExitCode::SUCCESS);
    }

    let store = RuleStore::load_lenient(&config.rule_sources()).context("Failed to build the rule store")?;

    if matches.get_flag("validate-rules") {
        return Ok(validate_rules(&store));
    }

    let modules: Vec<String> = match matches.get_many::<String>("module") {
        Some(values) => values.cloned().collect(),
        None => config.scan.modules.clone(),
    };
    let selection = ModuleSelection::parse(&modules).map_err(anyhow::Error::msg)?;
    let collectors = collectors::build(&selection, &config);

    let mut pipeline = Pipeline::new(Arc::new(RuleHandle::new(store)), config.pipeline_config());
    if config.explainer.enabled {
        match resolve_api_key(&config.explainer, ApiKeyStore::in_home().as_ref()) {
            Some(key) => {
                pipeline = pipeline.with_explainer(Arc::new(RemoteExplainer::new(&config.explainer, key)?));
                info!("🤖 Remote explanations enabled ({})", config.explainer.model);
            }
            None => warn!(
                "⚠️  Remote explanations requested but no API key found (set {} or use --set-api-key)",
                config.explainer.api_key_env
            ),
        }
    }

    info!("🛡️  SentinelGrade scanning {} modules", collectors.len());

    let report = tokio::select! {
        report = pipeline.run(collectors) => report,
        _ = signal::ctrl_c() => {
            info!("🛑 Scan interrupted");
            return Ok(ExitCode::from(130));
        }
    };

    print_report(&report, &console_filter(&matches));

    if report.is_empty() {
        println!("No findings to export.");
        return Ok(ExitCode::SUCCESS);
    }

    if !matches.get_flag("no-export") {
        let exporter = Exporter::new(&config.scan.output_dir);
        exporter.export(&report.findings, Local::now())?;
        println!(
            "Exported {} entries to '{}/'.",
            report.findings.len(),
            exporter.dir().display()
        );
    }

    Ok(ExitCode::SUCCESS)
}

fn apply_overrides(config: &mut Config, matches: &ArgMatches) {
    if let Some(dir) = matches.get_one::<PathBuf>("output") {
        config.scan.output_dir = dir.clone();
    }
    if let Some(path) = matches.get_one::<PathBuf>("rules") {
        config.rules.severity_rules = Some(path.clone());
    }
    if let Some(path) = matches.get_one::<PathBuf>("knowledge-base") {
        config.rules.knowledge_base = Some(path.clone());
    }
    if matches.get_flag("remote-explain") {
        config.explainer.enabled = true;
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn console_filter(matches: &ArgMatches) -> FindingFilter {
    FindingFilter {
        severity: matches
            .get_one::<String>("severity")
            .and_then(|s| Severity::from_str(s).ok()),
        module: matches.get_one::<String>("filter-module").cloned(),
    }
}

fn validate_rules(store: &RuleStore) -> ExitCode {
    let report = RuleValidator::new().validate(store);

    println!("🔍 Rule validation");
    println!("   • Severity rules: {}", store.severity_rule_count());
    println!("   • Knowledge base rules: {}", store.knowledge_base().len());
    for issue in &report.issues {
        println!("   {}", issue);
    }

    let errors = report.count(ValidationSeverity::Error);
    let warnings = report.count(ValidationSeverity::Warning);
    if errors > 0 {
        println!("❌ {} errors, {} warnings", errors, warnings);
        ExitCode::FAILURE
    } else {
        println!("✅ Rules are valid ({} warnings)", warnings);
        ExitCode::SUCCESS
    }
}

fn print_report(report: &ScanReport, filter: &FindingFilter) {
    for outcome in report.failed_collectors() {
        match outcome {
            CollectorOutcome::Failed { module, error } => println!("⚠️  {} collector failed: {}", module, error),
            CollectorOutcome::TimedOut { module, timeout_ms } => {
                println!("⚠️  {} collector timed out after {}ms", module, timeout_ms)
            }
            CollectorOutcome::Completed { .. } => {}
        }
    }

    let shown: Vec<_> = report
        .sorted_by_severity()
        .into_iter()
        .filter(|finding| filter.matches(finding))
        .collect();

    for finding in &shown {
        println!(
            "{} [{}] {} | {} | {}",
            finding.severity().icon(),
            finding.severity(),
            finding.module(),
            finding.name(),
            finding.status()
        );
        println!("    ↳ {}", finding.explanation());
        println!("    → {}", finding.recommendation());
    }

    let counts = report.severity_counts();
    println!("\n📊 Scan Summary ({} shown of {}):", shown.len(), counts.total());
    for (level, count) in counts.rows() {
        println!("   • {}: {}", level, count);
    }
}
