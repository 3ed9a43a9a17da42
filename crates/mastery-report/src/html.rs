//! HTML gradebook page.
//!
//! Produces a self-contained HTML file with all CSS/JS inlined.

use std::path::Path;

use anyhow::Result;

use mastery_core::gradebook::Gradebook;

use crate::{format_last_login, write_file};

/// Escape a string for safe HTML insertion.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn percent_class(percent: u8) -> &'static str {
    if percent >= 80 {
        "high"
    } else if percent >= 50 {
        "mid"
    } else {
        "low"
    }
}

/// Generate the gradebook page.
pub fn generate_html(gradebook: &Gradebook) -> String {
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str("<title>Vocabulary gradebook</title>\n");
    html.push_str("<style>\n");
    html.push_str(CSS);
    html.push_str("</style>\n");
    html.push_str("</head>\n<body>\n");

    html.push_str("<header>\n<h1>Vocabulary gradebook</h1>\n");
    let generated = gradebook
        .generated_at
        .map(|t| format!(" | generated {}", t.format("%Y-%m-%d %H:%M UTC")))
        .unwrap_or_default();
    html.push_str(&format!(
        "<p class=\"meta\">{} students | {} units{}</p>\n",
        gradebook.rows.len(),
        gradebook.unit_names.len(),
        generated
    ));
    html.push_str("</header>\n");

    if !gradebook.rows.is_empty() {
        html.push_str("<section class=\"dashboard\">\n<h2>Class average by unit</h2>\n");
        html.push_str(&generate_bar_chart(gradebook));
        html.push_str("</section>\n");
    }

    html.push_str("<section class=\"results\">\n<h2>Students</h2>\n");
    html.push_str("<table id=\"gradebook\">\n<thead><tr>");
    let columns = ["Name", "Block"]
        .into_iter()
        .map(str::to_string)
        .chain(gradebook.unit_names.iter().cloned())
        .chain(["Overall".to_string(), "Last login".to_string()]);
    for (i, column) in columns.enumerate() {
        html.push_str(&format!(
            "<th onclick=\"sortTable({i})\">{}</th>",
            html_escape(&column)
        ));
    }
    html.push_str("</tr></thead>\n<tbody>\n");

    for row in &gradebook.rows {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td>",
            html_escape(&row.name),
            html_escape(&row.block)
        ));
        for unit in &gradebook.unit_names {
            match row.percent_for(unit) {
                Some(p) => html.push_str(&format!(
                    "<td class=\"{}\" data-value=\"{p}\">{p}%</td>",
                    percent_class(p)
                )),
                None => html.push_str("<td data-value=\"-1\">-</td>"),
            }
        }
        html.push_str(&format!(
            "<td class=\"{} overall\" data-value=\"{}\">{}%</td><td>{}</td></tr>\n",
            percent_class(row.overall),
            row.overall,
            row.overall,
            html_escape(&format_last_login(row.last_login))
        ));
    }
    html.push_str("</tbody></table>\n</section>\n");

    html.push_str("<script>\n");
    html.push_str(JS);
    html.push_str("</script>\n");

    html.push_str("</body>\n</html>");
    html
}

/// Write the gradebook page to a file.
pub fn write_gradebook_html(gradebook: &Gradebook, path: &Path) -> Result<()> {
    write_file(path, &generate_html(gradebook))
}

/// Horizontal bars of the mean per-unit percentage across all rows.
fn generate_bar_chart(gradebook: &Gradebook) -> String {
    let bar_height = 24;
    let max_width = 400;
    let padding = 8;
    let label_width = 200;

    let averages: Vec<(&String, f64)> = gradebook
        .unit_names
        .iter()
        .map(|unit| {
            let scores: Vec<u8> = gradebook
                .rows
                .iter()
                .filter_map(|r| r.percent_for(unit))
                .collect();
            let mean = if scores.is_empty() {
                0.0
            } else {
                scores.iter().map(|&p| f64::from(p)).sum::<f64>() / scores.len() as f64
            };
            (unit, mean)
        })
        .collect();

    let total_height = averages.len() * (bar_height + padding) + padding;
    let mut svg = format!(
        "<svg width=\"{}\" height=\"{}\" xmlns=\"http://www.w3.org/2000/svg\">\n",
        label_width + max_width + 60,
        total_height
    );

    for (i, (unit, mean)) in averages.iter().enumerate() {
        let y = i * (bar_height + padding) + padding;
        let width = (mean / 100.0 * max_width as f64) as usize;
        let color = match percent_class(mean.round() as u8) {
            "high" => "#22c55e",
            "mid" => "#eab308",
            _ => "#ef4444",
        };

        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"14\" fill=\"currentColor\" text-anchor=\"end\" dominant-baseline=\"middle\">{}</text>\n",
            label_width - 10,
            y + bar_height / 2,
            html_escape(unit)
        ));
        svg.push_str(&format!(
            "  <rect x=\"{label_width}\" y=\"{y}\" width=\"{width}\" height=\"{bar_height}\" fill=\"{color}\" rx=\"4\"/>\n"
        ));
        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"12\" fill=\"currentColor\" dominant-baseline=\"middle\">{:.0}%</text>\n",
            label_width + width + 8,
            y + bar_height / 2,
            mean
        ));
    }

    svg.push_str("</svg>\n");
    svg
}

const CSS: &str = r#"
:root { --bg: #fff; --fg: #1a1a1a; --border: #e5e7eb; --high: #dcfce7; --mid: #fef9c3; --low: #fde2e2; }
@media (prefers-color-scheme: dark) {
  :root { --bg: #111827; --fg: #f9fafb; --border: #374151; --high: #064e3b; --mid: #713f12; --low: #7f1d1d; }
}
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; margin: 0; padding: 2rem; background: var(--bg); color: var(--fg); }
h1, h2 { margin-top: 2rem; }
.meta { color: #6b7280; }
table { border-collapse: collapse; width: 100%; margin: 1rem 0; }
th, td { border: 1px solid var(--border); padding: 0.5rem 1rem; text-align: left; }
th { background: var(--border); cursor: pointer; }
.high { background: var(--high); }
.mid { background: var(--mid); }
.low { background: var(--low); }
.overall { font-weight: bold; }
svg { margin: 1rem 0; }
"#;

const JS: &str = r#"
function sortTable(col) {
  const table = document.getElementById('gradebook');
  const tbody = table.querySelector('tbody');
  const rows = Array.from(tbody.querySelectorAll('tr'));
  const asc = table.dataset.sortCol == col && table.dataset.sortDir == 'asc' ? false : true;
  rows.sort((a, b) => {
    const ca = a.cells[col], cb = b.cells[col];
    if (ca.dataset.value !== undefined && cb.dataset.value !== undefined) {
      const d = Number(ca.dataset.value) - Number(cb.dataset.value);
      return asc ? d : -d;
    }
    return asc ? ca.textContent.localeCompare(cb.textContent) : cb.textContent.localeCompare(ca.textContent);
  });
  table.dataset.sortCol = col;
  table.dataset.sortDir = asc ? 'asc' : 'desc';
  rows.forEach(r => tbody.appendChild(r));
}
"#;
