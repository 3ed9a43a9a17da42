//! CSV gradebook export.
//!
//! Columns: `name,block,<unit...>,overall,last_login`. Fields are quoted per
//! RFC 4180 when they contain a comma, quote, or line break.

use std::path::Path;

use anyhow::Result;

use mastery_core::gradebook::Gradebook;

use crate::{format_last_login, write_file};

fn field(value: &str) -> String {
    if value.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn push_record<I, S>(out: &mut String, fields: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let line: Vec<String> = fields.into_iter().map(|f| field(f.as_ref())).collect();
    out.push_str(&line.join(","));
    out.push_str("\r\n");
}

/// Render the gradebook as CSV text.
pub fn gradebook_csv(gradebook: &Gradebook) -> String {
    let mut out = String::new();

    let header = ["name", "block"]
        .into_iter()
        .map(str::to_string)
        .chain(gradebook.unit_names.iter().cloned())
        .chain(["overall".to_string(), "last_login".to_string()]);
    push_record(&mut out, header);

    for row in &gradebook.rows {
        let record = [row.name.clone(), row.block.clone()]
            .into_iter()
            .chain(gradebook.unit_names.iter().map(|unit| {
                row.percent_for(unit)
                    .map(|p| p.to_string())
                    .unwrap_or_default()
            }))
            .chain([row.overall.to_string(), format_last_login(row.last_login)]);
        push_record(&mut out, record);
    }

    out
}

/// Write the gradebook as a CSV file.
pub fn write_gradebook_csv(gradebook: &Gradebook, path: &Path) -> Result<()> {
    write_file(path, &gradebook_csv(gradebook))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mastery_core::gradebook::{GradebookRow, UnitScore};

    fn score(unit: &str, mastered: usize, total: usize, percent: u8) -> UnitScore {
        UnitScore {
            unit: unit.into(),
            mastered,
            total,
            percent,
        }
    }

    fn book() -> Gradebook {
        Gradebook {
            generated_at: None,
            unit_names: vec!["Unit 1".into(), "Unit 2, Reconstruction".into()],
            rows: vec![
                GradebookRow {
                    name: "Ada Lovelace".into(),
                    block: "First".into(),
                    units: vec![
                        score("Unit 1", 2, 3, 67),
                        score("Unit 2, Reconstruction", 5, 5, 100),
                    ],
                    overall: 88,
                    last_login: Some(Utc.with_ymd_and_hms(2024, 3, 2, 9, 15, 0).unwrap()),
                },
                GradebookRow {
                    name: "Mary \"Molly\" Pitcher".into(),
                    block: "Second".into(),
                    units: vec![
                        score("Unit 1", 0, 3, 0),
                        score("Unit 2, Reconstruction", 0, 5, 0),
                    ],
                    overall: 0,
                    last_login: None,
                },
            ],
        }
    }

    #[test]
    fn header_and_rows() {
        let csv = gradebook_csv(&book());
        let lines: Vec<&str> = csv.split("\r\n").collect();
        assert_eq!(
            lines[0],
            "name,block,Unit 1,\"Unit 2, Reconstruction\",overall,last_login"
        );
        assert_eq!(lines[1], "Ada Lovelace,First,67,100,88,2024-03-02 09:15 AM");
        assert_eq!(lines[2], "\"Mary \"\"Molly\"\" Pitcher\",Second,0,0,0,");
        assert_eq!(lines[3], "");
    }

    #[test]
    fn writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gradebook.csv");
        write_gradebook_csv(&book(), &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("name,block,"));
    }
}
