//! Vocabulary catalog and its TOML loader.
//!
//! The catalog is loaded once at startup and never changes afterwards. A
//! unit whose source is broken is recorded as unavailable instead of failing
//! the whole load, so one bad word list only blocks entry to that unit.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::CatalogError;
use crate::model::{Unit, VocabTerm, MILESTONE_UNIT};

/// Immutable unit name → ordered terms mapping.
#[derive(Debug, Clone, Default)]
pub struct VocabCatalog {
    units: Vec<Unit>,
    unavailable: BTreeMap<String, String>,
    failed_sources: Vec<CatalogError>,
}

impl VocabCatalog {
    /// Build a catalog from already-parsed units.
    ///
    /// Units that fail validation (duplicate terms, blank fields, reserved
    /// name) are kept out of the catalog and reported as unavailable.
    pub fn from_units(units: Vec<Unit>) -> Self {
        let mut catalog = VocabCatalog::default();
        for unit in units {
            catalog.insert_unit(unit);
        }
        catalog
    }

    fn insert_unit(&mut self, unit: Unit) {
        if let Err(reason) = check_unit(&unit) {
            tracing::warn!("unit '{}' unavailable: {reason}", unit.name);
            self.unavailable.insert(unit.name, reason);
            return;
        }
        if self.units.iter().any(|u| u.name == unit.name) {
            let reason = "defined more than once".to_string();
            tracing::warn!("unit '{}' unavailable: {reason}", unit.name);
            self.units.retain(|u| u.name != unit.name);
            self.unavailable.insert(unit.name, reason);
            return;
        }
        if self.unavailable.contains_key(&unit.name) {
            return;
        }
        self.units.push(unit);
    }

    /// Regular units in load order (never includes Milestone).
    pub fn regular_units(&self) -> &[Unit] {
        &self.units
    }

    /// Look up a regular unit by name.
    pub fn unit(&self, name: &str) -> Result<&Unit, CatalogError> {
        if let Some(unit) = self.units.iter().find(|u| u.name == name) {
            return Ok(unit);
        }
        match self.unavailable.get(name) {
            Some(reason) => Err(CatalogError::Unavailable {
                unit: name.to_string(),
                reason: reason.clone(),
            }),
            None => Err(CatalogError::UnknownUnit(name.to_string())),
        }
    }

    /// True if at least one regular unit has terms to sample from.
    pub fn has_milestone(&self) -> bool {
        self.units.iter().any(|u| !u.is_empty())
    }

    /// Names a student can pick from: regular units, then Milestone.
    pub fn unit_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.units.iter().map(|u| u.name.clone()).collect();
        if self.has_milestone() {
            names.push(MILESTONE_UNIT.to_string());
        }
        names
    }

    /// Units that failed validation, with the reason.
    pub fn unavailable_units(&self) -> &BTreeMap<String, String> {
        &self.unavailable
    }

    /// Catalog files that could not be read or parsed at all.
    pub fn failed_sources(&self) -> &[CatalogError] {
        &self.failed_sources
    }

    /// Total number of terms across regular units.
    pub fn term_count(&self) -> usize {
        self.units.iter().map(Unit::len).sum()
    }
}

fn check_unit(unit: &Unit) -> Result<(), String> {
    if unit.name.trim().is_empty() {
        return Err("unit name is empty".into());
    }
    if unit.name == MILESTONE_UNIT {
        return Err(format!("'{MILESTONE_UNIT}' is reserved for the review unit"));
    }
    let mut seen = HashSet::new();
    for term in &unit.terms {
        if term.term.trim().is_empty() {
            return Err("a term is blank".into());
        }
        if term.definition.trim().is_empty() {
            return Err(format!("term '{}' has no definition", term.term));
        }
        if !seen.insert(term.term.as_str()) {
            return Err(format!("term '{}' appears more than once", term.term));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// TOML loading
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TomlCatalogFile {
    #[serde(default)]
    units: Vec<TomlUnit>,
}

#[derive(Debug, Deserialize)]
struct TomlUnit {
    name: String,
    #[serde(default)]
    terms: Vec<TomlTerm>,
}

#[derive(Debug, Deserialize)]
struct TomlTerm {
    term: String,
    definition: String,
    #[serde(default)]
    example: String,
}

/// Parse catalog TOML into units (useful for testing).
pub fn parse_units_str(content: &str, source_path: &Path) -> Result<Vec<Unit>> {
    let parsed: TomlCatalogFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    Ok(parsed
        .units
        .into_iter()
        .map(|u| {
            let name = u.name.trim().to_string();
            let terms = u
                .terms
                .into_iter()
                .map(|t| VocabTerm {
                    unit: name.clone(),
                    term: t.term.trim().to_string(),
                    definition: t.definition.trim().to_string(),
                    example: t.example.trim().to_string(),
                })
                .collect();
            Unit { name, terms }
        })
        .collect())
}

/// Load a catalog from a single TOML file.
pub fn parse_catalog_file(path: &Path) -> Result<VocabCatalog> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog file: {}", path.display()))?;
    Ok(VocabCatalog::from_units(parse_units_str(&content, path)?))
}

/// Load a catalog from a file, or every `.toml` file in a directory.
///
/// In a directory, a file that cannot be read or parsed is recorded in
/// [`VocabCatalog::failed_sources`] and the remaining files still load.
pub fn load_catalog(path: &Path) -> Result<VocabCatalog> {
    if !path.is_dir() {
        return parse_catalog_file(path);
    }

    let mut entries: Vec<_> = std::fs::read_dir(path)
        .with_context(|| format!("failed to read catalog directory: {}", path.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    entries.sort();

    let mut catalog = VocabCatalog::default();
    for file in entries {
        let loaded = std::fs::read_to_string(&file)
            .map_err(anyhow::Error::from)
            .and_then(|content| parse_units_str(&content, &file));
        match loaded {
            Ok(units) => {
                for unit in units {
                    catalog.insert_unit(unit);
                }
            }
            Err(e) => {
                tracing::warn!("skipping catalog file {}: {e:#}", file.display());
                catalog.failed_sources.push(CatalogError::Source {
                    source_path: file.display().to_string(),
                    reason: format!("{e:#}"),
                });
            }
        }
    }

    Ok(catalog)
}

/// A non-fatal issue found while validating a catalog.
#[derive(Debug, Clone)]
pub struct CatalogWarning {
    pub unit: Option<String>,
    pub message: String,
}

/// Check a loaded catalog for common authoring problems.
pub fn validate_catalog(catalog: &VocabCatalog) -> Vec<CatalogWarning> {
    let mut warnings = Vec::new();

    if catalog.regular_units().is_empty() {
        warnings.push(CatalogWarning {
            unit: None,
            message: "catalog has no usable units".into(),
        });
    }

    for source in catalog.failed_sources() {
        warnings.push(CatalogWarning {
            unit: None,
            message: source.to_string(),
        });
    }

    for (unit, reason) in catalog.unavailable_units() {
        warnings.push(CatalogWarning {
            unit: Some(unit.clone()),
            message: format!("unavailable: {reason}"),
        });
    }

    for unit in catalog.regular_units() {
        if unit.is_empty() {
            warnings.push(CatalogWarning {
                unit: Some(unit.name.clone()),
                message: "unit has no terms".into(),
            });
        }
        for term in &unit.terms {
            if term.example.is_empty() {
                warnings.push(CatalogWarning {
                    unit: Some(unit.name.clone()),
                    message: format!("term '{}' has no example sentence", term.term),
                });
            }
        }
    }

    warnings
}
