//! The `mastery gradebook` command.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use comfy_table::{Cell, Table};

use mastery_core::gradebook::{build_gradebook, Gradebook};
use mastery_core::traits::MasteryLedger;
use mastery_report::csv::{gradebook_csv, write_gradebook_csv};
use mastery_report::html::{generate_html, write_gradebook_html};
use mastery_report::{format_last_login, gradebook_json, write_gradebook_json};

use crate::commands::{load_settings, open_catalog, open_ledger};
use crate::SourceArgs;

pub async fn execute(
    format: String,
    output: Option<PathBuf>,
    block: Option<String>,
    sources: SourceArgs,
) -> Result<()> {
    let config = load_settings(&sources)?;
    let catalog = open_catalog(&config)?;
    let ledger = open_ledger(&config)?;

    let snapshot = ledger
        .snapshot()
        .await
        .context("failed to read the ledger")?;
    let mut gradebook = build_gradebook(&catalog, &snapshot, &config.milestone, Utc::now());
    if let Some(block) = &block {
        gradebook
            .rows
            .retain(|r| r.block.eq_ignore_ascii_case(block));
    }

    let Some(path) = output else {
        let rendered = match format.as_str() {
            "table" => render_table(&gradebook),
            "csv" => gradebook_csv(&gradebook),
            "html" => generate_html(&gradebook),
            "json" => format!("{}\n", gradebook_json(&gradebook)?),
            other => bail!("unknown format '{other}' (expected table, csv, html, or json)"),
        };
        print!("{rendered}");
        return Ok(());
    };

    match format.as_str() {
        "csv" => write_gradebook_csv(&gradebook, &path)?,
        "html" => write_gradebook_html(&gradebook, &path)?,
        "json" => write_gradebook_json(&gradebook, &path)?,
        "table" => std::fs::write(&path, render_table(&gradebook))
            .with_context(|| format!("failed to write {}", path.display()))?,
        other => bail!("unknown format '{other}' (expected table, csv, html, or json)"),
    }
    eprintln!("Gradebook written to: {}", path.display());

    Ok(())
}

fn render_table(gradebook: &Gradebook) -> String {
    if gradebook.is_empty() {
        return "No students have logged in yet.\n".to_string();
    }

    let mut table = Table::new();
    let mut header = vec!["Name".to_string(), "Block".to_string()];
    header.extend(gradebook.unit_names.iter().cloned());
    header.push("Overall".to_string());
    header.push("Last login".to_string());
    table.set_header(header);

    for row in &gradebook.rows {
        let mut cells = vec![Cell::new(&row.name), Cell::new(&row.block)];
        for unit in &gradebook.unit_names {
            let text = row
                .percent_for(unit)
                .map(|p| format!("{p}%"))
                .unwrap_or_else(|| "-".to_string());
            cells.push(Cell::new(text));
        }
        cells.push(Cell::new(format!("{}%", row.overall)));
        cells.push(Cell::new(format_last_login(row.last_login)));
        table.add_row(cells);
    }

    format!("{table}\n")
}
