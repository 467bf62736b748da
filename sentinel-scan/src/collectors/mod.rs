// sentinel-scan/src/collectors/mod.rs
// Host collectors and module selection

pub mod command;
pub mod external;
pub mod network;
pub mod process;
pub mod registry;
pub mod services;
pub mod startup;
pub mod system;
pub mod tasks;
pub mod wmi;

use crate::config::Config;
use sentinel_core::{Collector, Module};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Values accepted by `--module`
pub const MODULE_CHOICES: &[&str] = &[
    "services", "tasks", "wmi", "startup", "system", "network", "process", "registry", "all",
];

/// Windows-only collectors return nothing elsewhere.
pub(crate) fn windows_only(module: &str) -> bool {
    if cfg!(windows) {
        true
    } else {
        debug!("{} collector needs Windows, skipping on {}", module, std::env::consts::OS);
        false
    }
}

/// Which built-in collectors run. External collectors only run with `all`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSelection {
    modules: Vec<Module>,
    include_external: bool,
}

impl ModuleSelection {
    pub fn all() -> Self {
        Self {
            modules: Module::ALL.to_vec(),
            include_external: true,
        }
    }

    /// Parses module names (case-insensitive) or `all`. Collectors keep the
    /// fixed declaration order whatever order the names were given in.
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self, String> {
        if names.is_empty() || names.iter().any(|n| n.as_ref().trim().eq_ignore_ascii_case("all")) {
            return Ok(Self::all());
        }

        let mut wanted = Vec::with_capacity(names.len());
        for name in names {
            wanted.push(Module::from_str(name.as_ref())?);
        }
        Ok(Self {
            modules: Module::ALL.iter().copied().filter(|m| wanted.contains(m)).collect(),
            include_external: false,
        })
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn includes_external(&self) -> bool {
        self.include_external
    }
}

fn builtin(module: Module) -> Arc<dyn Collector> {
    match module {
        Module::Services => Arc::new(services::ServicesCollector),
        Module::Tasks => Arc::new(tasks::TasksCollector),
        Module::Wmi => Arc::new(wmi::WmiCollector),
        Module::Startup => Arc::new(startup::StartupCollector),
        Module::System => Arc::new(system::SystemCollector),
        Module::Network => Arc::new(network::NetworkCollector),
        Module::Process => Arc::new(process::ProcessCollector),
        Module::Registry => Arc::new(registry::RegistryCollector),
    }
}

/// Collectors for `selection`, built-ins first, then configured externals.
pub fn build(selection: &ModuleSelection, config: &Config) -> Vec<Arc<dyn Collector>> {
    let mut collectors: Vec<Arc<dyn Collector>> = selection.modules().iter().copied().map(builtin).collect();
    if selection.includes_external() {
        for external in &config.collectors.external {
            collectors.push(Arc::new(external::ExternalCollector::new(external)));
        }
    }
    collectors
}
