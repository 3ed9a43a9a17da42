//! The `mastery validate` command.

use std::path::PathBuf;

use anyhow::Result;

use mastery_core::catalog::{load_catalog, validate_catalog};

pub fn execute(catalog_path: PathBuf) -> Result<()> {
    let catalog = load_catalog(&catalog_path)?;

    println!(
        "Catalog: {} ({} units, {} terms)",
        catalog_path.display(),
        catalog.regular_units().len(),
        catalog.term_count()
    );
    for unit in catalog.regular_units() {
        println!("  {} ({} terms)", unit.name, unit.len());
    }

    let warnings = validate_catalog(&catalog);
    for w in &warnings {
        let prefix = w
            .unit
            .as_ref()
            .map(|unit| format!("  [{unit}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }

    if warnings.is_empty() {
        println!("Catalog valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
