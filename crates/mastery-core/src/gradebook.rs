//! Gradebook aggregation over a ledger snapshot.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::VocabCatalog;
use crate::model::{StudentId, MILESTONE_UNIT};
use crate::sampling::MilestoneConfig;
use crate::traits::LedgerSnapshot;

/// `mastered / total * 100`, rounded half up and clamped to `0..=100`.
///
/// A unit with no terms is 0%.
pub fn round_half_up_percent(mastered: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let mastered = mastered.min(total) as u64;
    let total = total as u64;
    // floor(x + 0.5) with x = 100m/t, kept in integers
    ((mastered * 200 + total) / (2 * total)).min(100) as u8
}

/// One student's percentage for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitScore {
    pub unit: String,
    pub mastered: usize,
    pub total: usize,
    pub percent: u8,
}

/// One row of the gradebook: a student in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradebookRow {
    pub name: String,
    pub block: String,
    /// Scores in the same order as [`Gradebook::unit_names`].
    pub units: Vec<UnitScore>,
    /// Over regular units only.
    pub overall: u8,
    pub last_login: Option<DateTime<Utc>>,
}

impl GradebookRow {
    pub fn percent_for(&self, unit: &str) -> Option<u8> {
        self.units.iter().find(|s| s.unit == unit).map(|s| s.percent)
    }
}

/// Per-student mastery percentages for every unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gradebook {
    pub generated_at: Option<DateTime<Utc>>,
    /// Column order: regular units, then Milestone if any regular unit has terms.
    pub unit_names: Vec<String>,
    pub rows: Vec<GradebookRow>,
}

impl Gradebook {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows for one block.
    pub fn block<'a>(&'a self, block: &'a str) -> impl Iterator<Item = &'a GradebookRow> + 'a {
        self.rows.iter().filter(move |r| r.block == block)
    }
}

/// Build the gradebook from a catalog and a ledger snapshot.
///
/// Only mastered records for terms the catalog still lists are counted for
/// regular units. Milestone records count against the Milestone sample size.
/// The result depends only on the arguments; `generated_at` is stamped as
/// given.
pub fn build_gradebook(
    catalog: &VocabCatalog,
    snapshot: &LedgerSnapshot,
    milestone: &MilestoneConfig,
    generated_at: DateTime<Utc>,
) -> Gradebook {
    // student -> unit -> mastered terms
    let mut mastered: BTreeMap<&StudentId, BTreeMap<&str, BTreeSet<&str>>> = BTreeMap::new();
    for record in snapshot.records.iter().filter(|r| r.mastered) {
        mastered
            .entry(&record.student)
            .or_default()
            .entry(record.unit.as_str())
            .or_default()
            .insert(record.term.as_str());
    }

    let mut logins: BTreeMap<&StudentId, DateTime<Utc>> = BTreeMap::new();
    for login in &snapshot.logins {
        let entry = logins.entry(&login.student).or_insert(login.last_login);
        if login.last_login > *entry {
            *entry = login.last_login;
        }
    }

    let mut students: Vec<&StudentId> = mastered
        .keys()
        .chain(logins.keys())
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    students.sort_by_cached_key(|s| (s.display_name(), s.block.clone(), s.first_name.clone()));

    let milestone_total = milestone.total_terms(catalog);
    let mut unit_names: Vec<String> = catalog
        .regular_units()
        .iter()
        .map(|u| u.name.clone())
        .collect();
    if milestone_total > 0 {
        unit_names.push(MILESTONE_UNIT.to_string());
    }

    let empty = BTreeMap::new();
    let rows = students
        .into_iter()
        .map(|student| {
            let by_unit = mastered.get(student).unwrap_or(&empty);
            let mut units = Vec::with_capacity(unit_names.len());
            let (mut sum_mastered, mut sum_total) = (0usize, 0usize);

            for unit in catalog.regular_units() {
                let count = by_unit
                    .get(unit.name.as_str())
                    .map(|terms| terms.iter().filter(|t| unit.contains_term(t)).count())
                    .unwrap_or(0);
                sum_mastered += count;
                sum_total += unit.len();
                units.push(UnitScore {
                    unit: unit.name.clone(),
                    mastered: count,
                    total: unit.len(),
                    percent: round_half_up_percent(count, unit.len()),
                });
            }

            if milestone_total > 0 {
                let count = by_unit
                    .get(MILESTONE_UNIT)
                    .map(|terms| terms.len().min(milestone_total))
                    .unwrap_or(0);
                units.push(UnitScore {
                    unit: MILESTONE_UNIT.to_string(),
                    mastered: count,
                    total: milestone_total,
                    percent: round_half_up_percent(count, milestone_total),
                });
            }

            GradebookRow {
                name: student.display_name(),
                block: student.block.clone(),
                units,
                overall: round_half_up_percent(sum_mastered, sum_total),
                last_login: logins.get(student).copied(),
            }
        })
        .collect();

    Gradebook {
        generated_at: Some(generated_at),
        unit_names,
        rows,
    }
}
