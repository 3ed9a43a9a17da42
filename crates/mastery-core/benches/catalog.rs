use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mastery_core::catalog::{parse_units_str, VocabCatalog};
use mastery_core::evaluator::is_loosely_correct;
use mastery_core::model::StudentId;
use mastery_core::sampling::{MilestoneConfig, SamplingMode};

fn generate_catalog_toml(units: usize, terms: usize) -> String {
    let mut s = String::new();
    for u in 0..units {
        s.push_str(&format!("[[units]]\nname = \"Unit {u}\"\n\n"));
        for t in 0..terms {
            s.push_str(&format!(
                "[[units.terms]]\nterm = \"term-{u}-{t}\"\ndefinition = \"what term {t} of unit {u} means\"\nexample = \"An example using term {t}.\"\n\n"
            ));
        }
    }
    s
}

fn bench_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("catalog_parsing");
    let path = std::path::Path::new("bench.toml");

    for (label, units, terms) in [("small", 2, 10), ("medium", 8, 25), ("large", 20, 50)] {
        let toml = generate_catalog_toml(units, terms);
        group.bench_function(label, |b| {
            b.iter(|| parse_units_str(black_box(&toml), path).unwrap())
        });
    }

    group.finish();
}

fn bench_milestone_sampling(c: &mut Criterion) {
    let toml = generate_catalog_toml(8, 25);
    let units = parse_units_str(&toml, std::path::Path::new("bench.toml")).unwrap();
    let catalog = VocabCatalog::from_units(units);
    let student = StudentId {
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        block: "First".into(),
    };

    let mut group = c.benchmark_group("milestone_sample");
    for mode in [SamplingMode::Seeded, SamplingMode::Fresh] {
        let config = MilestoneConfig {
            sampling: mode,
            ..Default::default()
        };
        group.bench_function(format!("{mode:?}"), |b| {
            b.iter(|| config.sample(black_box(&catalog), black_box(&student)))
        });
    }
    group.finish();
}

fn bench_local_heuristic(c: &mut Criterion) {
    let definition = "a set of beliefs or principles taught and accepted by a particular group";
    c.bench_function("is_loosely_correct", |b| {
        b.iter(|| is_loosely_correct(black_box("something the group believes in"), definition))
    });
}

criterion_group!(
    benches,
    bench_parsing,
    bench_milestone_sampling,
    bench_local_heuristic
);
criterion_main!(benches);
