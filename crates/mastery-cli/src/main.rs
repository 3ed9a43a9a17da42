//! mastery CLI: study vocabulary units and export the gradebook.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "mastery", version, about = "Classroom vocabulary mastery tutor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Overrides shared by commands that read the config file.
#[derive(clap::Args, Clone, Default)]
pub struct SourceArgs {
    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Catalog file or directory (overrides config)
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Ledger directory (overrides config)
    #[arg(long)]
    pub ledger: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter config and example catalog
    Init,

    /// Validate catalog TOML files
    Validate {
        /// Catalog file or directory
        #[arg(long)]
        catalog: PathBuf,
    },

    /// List the units a student can pick
    Units {
        #[command(flatten)]
        sources: SourceArgs,
    },

    /// Work through a unit, one term at a time, reading answers from stdin
    Study {
        /// Student first name
        #[arg(long)]
        first: String,

        /// Student last name
        #[arg(long)]
        last: String,

        /// Class block (e.g. "First")
        #[arg(long)]
        block: String,

        /// Unit to study; asked for interactively when omitted
        #[arg(long)]
        unit: Option<String>,

        /// Evaluator: "local" or a configured provider name (overrides config)
        #[arg(long)]
        evaluator: Option<String>,

        #[command(flatten)]
        sources: SourceArgs,
    },

    /// Show or export per-student mastery percentages
    Gradebook {
        /// Output format: table, csv, html, json
        #[arg(long, default_value = "table")]
        format: String,

        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// Only include this block
        #[arg(long)]
        block: Option<String>,

        #[command(flatten)]
        sources: SourceArgs,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mastery=info".parse().expect("static directive")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => commands::init::execute(),
        Commands::Validate { catalog } => commands::validate::execute(catalog),
        Commands::Units { sources } => commands::units::execute(sources),
        Commands::Study {
            first,
            last,
            block,
            unit,
            evaluator,
            sources,
        } => {
            commands::study::execute(
                commands::study::StudyArgs {
                    first,
                    last,
                    block,
                    unit,
                    evaluator,
                },
                sources,
            )
            .await
        }
        Commands::Gradebook {
            format,
            output,
            block,
            sources,
        } => commands::gradebook::execute(format, output, block, sources).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
