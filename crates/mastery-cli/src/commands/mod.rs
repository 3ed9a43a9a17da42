pub mod gradebook;
pub mod init;
pub mod study;
pub mod units;
pub mod validate;

use std::sync::Arc;

use anyhow::{Context, Result};

use mastery_core::catalog::{load_catalog, VocabCatalog};
use mastery_core::ledger::FileLedger;
use mastery_providers::config::load_config_from;
use mastery_providers::MasteryConfig;

use crate::SourceArgs;

/// Load the config and apply command-line overrides.
pub fn load_settings(sources: &SourceArgs) -> Result<MasteryConfig> {
    let mut config = load_config_from(sources.config.as_deref())?;
    if let Some(catalog) = &sources.catalog {
        config.catalog = catalog.clone();
    }
    if let Some(ledger) = &sources.ledger {
        config.ledger_dir = ledger.clone();
    }
    Ok(config)
}

pub fn open_catalog(config: &MasteryConfig) -> Result<Arc<VocabCatalog>> {
    let catalog = load_catalog(&config.catalog)
        .with_context(|| format!("failed to load catalog from {}", config.catalog.display()))?;
    for (unit, reason) in catalog.unavailable_units() {
        eprintln!("Warning: unit '{unit}' is unavailable: {reason}");
    }
    Ok(Arc::new(catalog))
}

pub fn open_ledger(config: &MasteryConfig) -> Result<Arc<FileLedger>> {
    let ledger = FileLedger::open(&config.ledger_dir)
        .with_context(|| format!("failed to open ledger at {}", config.ledger_dir.display()))?;
    Ok(Arc::new(ledger))
}
