//! The `mastery init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    if Path::new("mastery.toml").exists() {
        println!("mastery.toml already exists, skipping.");
    } else {
        std::fs::write("mastery.toml", SAMPLE_CONFIG)?;
        println!("Created mastery.toml");
    }

    std::fs::create_dir_all("vocab")?;
    let example_path = Path::new("vocab/units.toml");
    if example_path.exists() {
        println!("vocab/units.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_CATALOG)?;
        println!("Created vocab/units.toml");
    }

    println!("\nNext steps:");
    println!("  1. Add your word lists under vocab/");
    println!("  2. Run: mastery validate --catalog vocab");
    println!("  3. Run: mastery study --first Ada --last Lovelace --block First --unit \"Unit 1\"");
    println!("  4. Run: mastery gradebook");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# mastery configuration

catalog = "vocab"
ledger_dir = "mastery-data"
blocks = ["First", "Second", "Fourth"]

# "local" checks answers against the definition; set to a provider name
# below to let a tutor model judge answers instead.
evaluator = "local"
default_model = "gpt-4.1-mini"

[engine]
retest_mastered = false
persist_retries = 3
retry_delay_ms = 200

[milestone]
terms_per_unit = 3
sampling = "seeded"   # or "fresh"
seed = 0

[delegated]
markers = ["correct", "you got it", "let's move on"]
timeout_secs = 30
transcript_window = 8

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

[providers.anthropic]
type = "anthropic"
api_key = "${ANTHROPIC_API_KEY}"

[providers.ollama]
type = "ollama"
base_url = "http://localhost:11434"
"#;

const EXAMPLE_CATALOG: &str = r#"[[units]]
name = "Unit 1"

[[units.terms]]
term = "doctrine"
definition = "a set of beliefs taught by a group"
example = "The Monroe Doctrine warned European powers to stay out of the Americas."

[[units.terms]]
term = "tariff"
definition = "a tax placed on imported goods"
example = "Southern planters opposed the tariff of 1828."

[[units]]
name = "Unit 2"

[[units.terms]]
term = "abolition"
definition = "the movement to end slavery"
example = "Frederick Douglass was a leader of the abolition movement."
"#;
