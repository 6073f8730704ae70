//! # Notebook Engine CLI (`nbe`)
//!
//! The `nbe` binary drives the notebook generation backend. It provides
//! commands for database initialization, document ingestion, one-shot
//! question answering, artifact generation, and starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! nbe --config ./config/nbe.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `nbe init` | Create the SQLite database and run schema migrations |
//! | `nbe ingest <keys...>` | Load, chunk, embed, and index documents |
//! | `nbe ask "<question>" --keys <keys...>` | Answer a question over documents |
//! | `nbe mcq --keys <keys...>` | Generate 5 multiple-choice questions |
//! | `nbe flashcards --keys <keys...>` | Generate 5 flashcards |
//! | `nbe serve` | Start the HTTP API server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! nbe init --config ./config/nbe.toml
//!
//! # Index two documents
//! nbe ingest uploads/math.pdf uploads/history.pdf
//!
//! # Ask a question grounded in one of them
//! nbe ask "What is the chain rule?" --keys uploads/math.pdf
//!
//! # Generate a quiz
//! nbe mcq --keys uploads/math.pdf
//!
//! # Start the HTTP server for the notebook frontend
//! nbe serve --config ./config/nbe.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use notebook_engine::{config, migrate, pipeline::Pipeline, server};

/// Notebook Engine CLI — a document-grounded generation backend for a study
/// notebook.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/nbe.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "nbe",
    about = "Notebook Engine — a document-grounded generation backend for study notebooks",
    version,
    long_about = "Notebook Engine ingests a student's documents (PDF and plain text), chunks and \
    embeds them into per-document vector namespaces, and generates grounded chat answers, \
    flashcards, and multiple-choice quizzes via a CLI and an HTTP API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/nbe.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the chat tables. This command
    /// is idempotent — running it multiple times is safe.
    Init,

    /// Load, chunk, embed, and index documents.
    ///
    /// Unloadable documents are skipped with a warning; embedding failures
    /// abort the run.
    Ingest {
        /// Storage keys to ingest (e.g. `uploads/math.pdf`).
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Answer a question grounded in the given documents.
    Ask {
        /// The question to answer.
        question: String,

        /// Storage keys of the documents to answer from.
        #[arg(long, required = true, num_args = 1..)]
        keys: Vec<String>,
    },

    /// Generate 5 multiple-choice questions from the given documents.
    Mcq {
        /// Storage keys of the source documents.
        #[arg(long, required = true, num_args = 1..)]
        keys: Vec<String>,
    },

    /// Generate 5 flashcards from the given documents.
    Flashcards {
        /// Storage keys of the source documents.
        #[arg(long, required = true, num_args = 1..)]
        keys: Vec<String>,
    },

    /// Start the HTTP API server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { keys } => {
            let pipeline = Pipeline::from_config(&cfg)?;
            let report = pipeline.ingest(&keys).await?;
            println!(
                "Indexed {} chunks from {} documents ({} skipped).",
                report.chunks_indexed,
                report.documents.len(),
                report.skipped
            );
        }
        Commands::Ask { question, keys } => {
            let pipeline = Pipeline::from_config(&cfg)?;
            let answer = pipeline.ask(&keys, &question).await?;
            println!("{}", answer);
        }
        Commands::Mcq { keys } => {
            let pipeline = Pipeline::from_config(&cfg)?;
            let questions = pipeline.build_mcq(&keys).await?;
            println!("{}", serde_json::to_string_pretty(&questions)?);
        }
        Commands::Flashcards { keys } => {
            let pipeline = Pipeline::from_config(&cfg)?;
            let cards = pipeline.build_flashcards(&keys).await?;
            println!("{}", serde_json::to_string_pretty(&cards)?);
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
