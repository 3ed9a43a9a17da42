//! Milestone term sampling.
//!
//! The Milestone unit draws a fixed number of terms from every regular
//! unit. Whether the draw is stable per student or fresh each session is an
//! explicit setting rather than an accident of the RNG.

use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::VocabCatalog;
use crate::model::{StudentId, VocabTerm};

/// How Milestone terms are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingMode {
    /// Same sample for a student on every visit.
    #[default]
    Seeded,
    /// New sample from OS entropy on every visit.
    Fresh,
}

/// Milestone sampling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneConfig {
    /// Terms drawn from each regular unit (capped at the unit's size).
    #[serde(default = "default_terms_per_unit")]
    pub terms_per_unit: usize,
    #[serde(default)]
    pub sampling: SamplingMode,
    /// Base seed mixed with the student identity in `Seeded` mode.
    #[serde(default)]
    pub seed: u64,
}

fn default_terms_per_unit() -> usize {
    3
}

impl Default for MilestoneConfig {
    fn default() -> Self {
        Self {
            terms_per_unit: default_terms_per_unit(),
            sampling: SamplingMode::default(),
            seed: 0,
        }
    }
}

impl MilestoneConfig {
    /// Draw the Milestone term sequence for a student.
    ///
    /// Units are visited in catalog order and the chosen terms keep their
    /// catalog order within each unit.
    pub fn sample(&self, catalog: &VocabCatalog, student: &StudentId) -> Vec<VocabTerm> {
        let mut rng = match self.sampling {
            SamplingMode::Seeded => ChaCha8Rng::seed_from_u64(self.seed ^ student_seed(student)),
            SamplingMode::Fresh => ChaCha8Rng::from_entropy(),
        };

        let mut picked = Vec::new();
        for unit in catalog.regular_units() {
            let amount = self.terms_per_unit.min(unit.len());
            if amount == 0 {
                continue;
            }
            let mut indices = index::sample(&mut rng, unit.len(), amount).into_vec();
            indices.sort_unstable();
            picked.extend(indices.into_iter().map(|i| unit.terms[i].clone()));
        }
        picked
    }

    /// Number of terms a Milestone sample contains for this catalog.
    pub fn total_terms(&self, catalog: &VocabCatalog) -> usize {
        catalog
            .regular_units()
            .iter()
            .map(|u| self.terms_per_unit.min(u.len()))
            .sum()
    }
}

/// 64-bit FNV-1a; stable across runs, builds and platforms.
pub(crate) fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    bytes
        .iter()
        .fold(OFFSET, |hash, &b| (hash ^ u64::from(b)).wrapping_mul(PRIME))
}

fn student_seed(student: &StudentId) -> u64 {
    let key = format!(
        "{}\u{1f}{}\u{1f}{}",
        student.first_name, student.last_name, student.block
    );
    fnv1a(key.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Unit;

    fn unit(name: &str, count: usize) -> Unit {
        Unit {
            name: name.into(),
            terms: (0..count)
                .map(|i| VocabTerm {
                    unit: name.into(),
                    term: format!("{name}-term-{i}"),
                    definition: format!("definition {i}"),
                    example: String::new(),
                })
                .collect(),
        }
    }

    fn student(first: &str) -> StudentId {
        StudentId {
            first_name: first.into(),
            last_name: "Student".into(),
            block: "First".into(),
        }
    }

    fn catalog() -> VocabCatalog {
        VocabCatalog::from_units(vec![unit("Unit 1", 10), unit("Unit 2", 2), unit("Unit 3", 0)])
    }

    #[test]
    fn draws_only_from_regular_units_within_limits() {
        let config = MilestoneConfig::default();
        let catalog = catalog();
        let sample = config.sample(&catalog, &student("Ada"));

        assert_eq!(sample.len(), 5);
        assert_eq!(config.total_terms(&catalog), 5);
        assert_eq!(sample.iter().filter(|t| t.unit == "Unit 1").count(), 3);
        assert_eq!(sample.iter().filter(|t| t.unit == "Unit 2").count(), 2);
        for t in &sample {
            let source = catalog.unit(&t.unit).unwrap();
            assert!(source.contains_term(&t.term));
        }
    }

    #[test]
    fn seeded_is_stable_per_student() {
        let config = MilestoneConfig {
            terms_per_unit: 2,
            ..Default::default()
        };
        let catalog = catalog();
        let first = config.sample(&catalog, &student("Ada"));
        let again = config.sample(&catalog, &student("Ada"));
        assert_eq!(first, again);
    }

    #[test]
    fn fnv1a_matches_reference_vectors() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn sample_keeps_catalog_order() {
        let config = MilestoneConfig {
            terms_per_unit: 4,
            ..Default::default()
        };
        let catalog = catalog();
        let sample = config.sample(&catalog, &student("Grace"));
        let unit1 = catalog.unit("Unit 1").unwrap();
        let positions: Vec<usize> = sample
            .iter()
            .filter(|t| t.unit == "Unit 1")
            .map(|t| unit1.terms.iter().position(|u| u.term == t.term).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn fresh_mode_respects_limits() {
        let config = MilestoneConfig {
            terms_per_unit: 50,
            sampling: SamplingMode::Fresh,
            seed: 0,
        };
        let sample = config.sample(&catalog(), &student("Ada"));
        assert_eq!(sample.len(), 12);
    }

    #[test]
    fn empty_catalog_gives_empty_sample() {
        let config = MilestoneConfig::default();
        let catalog = VocabCatalog::from_units(vec![unit("Unit 1", 0)]);
        assert!(config.sample(&catalog, &student("Ada")).is_empty());
    }

    #[test]
    fn parses_from_toml() {
        let config: MilestoneConfig =
            toml::from_str("terms_per_unit = 2\nsampling = \"fresh\"\nseed = 7").unwrap();
        assert_eq!(config.terms_per_unit, 2);
        assert_eq!(config.sampling, SamplingMode::Fresh);
        assert_eq!(config.seed, 7);
    }
}
