//! mastery-report: Gradebook exporters.
//!
//! Renders a [`Gradebook`] as CSV (for spreadsheets), a self-contained
//! HTML page, or pretty-printed JSON.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use mastery_core::gradebook::Gradebook;

pub mod csv;
pub mod html;

/// Format used for the last-login column.
pub const LAST_LOGIN_FORMAT: &str = "%Y-%m-%d %I:%M %p";

/// Last login as shown in exports; empty when the student never logged in.
pub fn format_last_login(last_login: Option<DateTime<Utc>>) -> String {
    last_login
        .map(|t| t.format(LAST_LOGIN_FORMAT).to_string())
        .unwrap_or_default()
}

/// Write `contents` to `path`, creating parent directories.
pub(crate) fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, contents)
        .with_context(|| format!("failed to write {}", path.display()))
}

/// Serialize the gradebook as pretty JSON.
pub fn gradebook_json(gradebook: &Gradebook) -> Result<String> {
    serde_json::to_string_pretty(gradebook).context("failed to serialize gradebook")
}

/// Save the gradebook as JSON to a file.
pub fn write_gradebook_json(gradebook: &Gradebook, path: &Path) -> Result<()> {
    write_file(path, &gradebook_json(gradebook)?)
}
