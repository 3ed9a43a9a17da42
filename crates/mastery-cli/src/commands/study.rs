//! The `mastery study` command.
//!
//! Reads one answer per line from stdin. `:quit` leaves the unit early;
//! progress already mastered is kept.

use anyhow::{bail, Result};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use mastery_core::catalog::VocabCatalog;
use mastery_core::engine::{ProgressionEngine, COMPLETE_MESSAGE};
use mastery_core::error::EngineError;
use mastery_core::session::SessionDesk;
use mastery_providers::build_evaluator;

use crate::commands::{load_settings, open_catalog, open_ledger};
use crate::SourceArgs;

pub struct StudyArgs {
    pub first: String,
    pub last: String,
    pub block: String,
    pub unit: Option<String>,
    pub evaluator: Option<String>,
}

type InputLines = Lines<BufReader<Stdin>>;

fn tutor_says(text: &str) {
    if !text.is_empty() {
        println!("Tutor: {text}");
    }
}

/// Errors a student can fix themselves are shown as their inline message.
fn student_facing(e: EngineError) -> anyhow::Error {
    match e {
        EngineError::Validation(_) | EngineError::Catalog(_) => anyhow::anyhow!(e.user_message()),
        other => other.into(),
    }
}

pub async fn execute(args: StudyArgs, sources: SourceArgs) -> Result<()> {
    let mut config = load_settings(&sources)?;
    if let Some(evaluator) = args.evaluator {
        config.evaluator = evaluator;
    }

    let catalog = open_catalog(&config)?;
    let ledger = open_ledger(&config)?;
    let evaluator = build_evaluator(&config)?;
    let engine = ProgressionEngine::new(catalog.clone(), ledger, evaluator, config.engine_config());

    let student = engine
        .login(&args.first, &args.last, &args.block)
        .await
        .map_err(student_facing)?;
    println!("Welcome, {}!", student.display_name());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let unit = match args.unit {
        Some(unit) => unit,
        None => choose_unit(&catalog, &mut lines).await?,
    };

    let start = engine
        .start_unit(&student, &unit)
        .await
        .map_err(student_facing)?;
    println!("Unit: {unit}");
    if start.reply.complete {
        tutor_says(&start.reply.feedback_text);
        engine.end_session(start.session);
        return Ok(());
    }
    let mut question = start.reply.prompt.clone().unwrap_or_default();
    tutor_says(&question);

    let desk = SessionDesk::new();
    desk.insert(start.session);

    while let Some(line) = lines.next_line().await? {
        let answer = line.trim();
        if answer == ":quit" {
            break;
        }
        println!("You: {answer}");

        let reply = desk.submit(&engine, &student, answer).await?;
        tutor_says(&reply.feedback_text);

        // the answer was not judged; ask the same question again
        if reply.error.as_ref().is_some_and(EngineError::is_retryable) {
            tutor_says(&question);
            continue;
        }

        if reply.complete {
            if reply.feedback_text != COMPLETE_MESSAGE {
                tutor_says(COMPLETE_MESSAGE);
            }
            break;
        }
        if reply.mastered {
            let next = desk.advance(&engine, &student)?;
            if let Some(prompt) = next.prompt {
                tutor_says(&prompt);
                question = prompt;
            }
        }
    }

    if let Some(session) = desk.remove(&student) {
        let summary = engine.end_session(session);
        println!(
            "\n{}: mastered {} of {} remaining terms this session.",
            summary.unit, summary.terms_mastered, summary.terms_total
        );
    }

    Ok(())
}

/// Ask for a unit by number or name until a valid one is given.
async fn choose_unit(catalog: &VocabCatalog, lines: &mut InputLines) -> Result<String> {
    let names = catalog.unit_names();
    if names.is_empty() {
        bail!("the catalog has no units to study");
    }

    println!("Choose a unit to begin:");
    for (i, name) in names.iter().enumerate() {
        println!("  {}. {name}", i + 1);
    }

    while let Some(line) = lines.next_line().await? {
        let choice = line.trim();
        if let Some(name) = pick(&names, choice) {
            return Ok(name);
        }
        println!("There is no unit called '{choice}'. Pick another unit.");
    }
    bail!("no unit selected")
}

fn pick(names: &[String], choice: &str) -> Option<String> {
    if let Ok(n) = choice.parse::<usize>() {
        return n.checked_sub(1).and_then(|i| names.get(i)).cloned();
    }
    names
        .iter()
        .find(|name| name.eq_ignore_ascii_case(choice))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_by_number_or_name() {
        let names = vec!["Unit 1".to_string(), "Milestone".to_string()];
        assert_eq!(pick(&names, "2").as_deref(), Some("Milestone"));
        assert_eq!(pick(&names, "unit 1").as_deref(), Some("Unit 1"));
        assert_eq!(pick(&names, "0"), None);
        assert_eq!(pick(&names, "3"), None);
        assert_eq!(pick(&names, "Unit 9"), None);
    }
}
