//! The `mastery units` command.

use anyhow::Result;

use mastery_core::model::MILESTONE_UNIT;

use crate::commands::{load_settings, open_catalog};
use crate::SourceArgs;

pub fn execute(sources: SourceArgs) -> Result<()> {
    let config = load_settings(&sources)?;
    let catalog = open_catalog(&config)?;

    if catalog.unit_names().is_empty() {
        println!("No units available. Check the catalog with `mastery validate`.");
        return Ok(());
    }

    for unit in catalog.regular_units() {
        println!("{} ({} terms)", unit.name, unit.len());
    }
    if catalog.has_milestone() {
        println!(
            "{MILESTONE_UNIT} ({} terms, review across all units)",
            config.milestone.total_terms(&catalog)
        );
    }
    for unit in catalog.unavailable_units().keys() {
        println!("{unit} (unavailable)");
    }

    Ok(())
}
