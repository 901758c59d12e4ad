//! # Lectern CLI (`lectern`)
//!
//! The `lectern` binary ingests course documents and answers questions
//! about them, either one-off on the command line or as an HTTP service.
//!
//! ## Usage
//!
//! ```bash
//! lectern --config ./config/lectern.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lectern ingest [path]` | Index course documents from a folder |
//! | `lectern query "<question>"` | Answer a question about the indexed courses |
//! | `lectern courses` | List indexed courses |
//! | `lectern serve` | Start the HTTP API server |
//!
//! ## Examples
//!
//! ```bash
//! # Index the configured docs folder
//! lectern ingest --config ./config/lectern.toml
//!
//! # Index a specific folder, replacing the current index
//! lectern ingest ./course_docs --clear
//!
//! # One-off question
//! lectern query "What does lesson 2 of the MCP course cover?"
//!
//! # Follow-up in the same conversation
//! lectern query "And lesson 3?" --session session_6f9619ff-8b86-d011-b42d-00cf4fc964ff
//!
//! # Start the HTTP API
//! lectern serve
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use lectern::config;
use lectern::ingest;
use lectern::rag::RagSystem;
use lectern::server;

/// Lectern CLI: retrieval-augmented question answering over course
/// materials.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/lectern.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "lectern",
    about = "Retrieval-augmented question answering over course materials",
    version,
    long_about = "Lectern ingests structured course documents, indexes them for search, and \
    answers questions about them with a tool-calling language model, exposed through a CLI and \
    a JSON HTTP API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/lectern.toml`. Model, chunking, retrieval,
    /// session, ingestion, and server settings are read from this file.
    #[arg(long, global = true, default_value = "./config/lectern.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Index course documents from a folder.
    ///
    /// Scans the folder for `.txt`/`.md` files, parses course structure and
    /// lesson markers, chunks the text, and indexes every course that is
    /// not already present. Re-running over the same folder is a no-op
    /// unless `--clear` is given.
    Ingest {
        /// Folder of course documents. Defaults to `[ingest].docs_dir`.
        path: Option<PathBuf>,

        /// Drop the existing index before ingesting.
        #[arg(long)]
        clear: bool,
    },

    /// Ask a question about the indexed courses.
    ///
    /// Loads the configured docs folder, then runs one tool-calling
    /// round-trip against the model. Requires `ANTHROPIC_API_KEY` in the
    /// environment.
    Query {
        /// The question to answer.
        question: String,

        /// Session id from a previous query, to carry conversation history.
        #[arg(long)]
        session: Option<String>,
    },

    /// List indexed courses.
    ///
    /// Loads the configured docs folder and prints the course count and
    /// titles.
    Courses,

    /// Start the HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves
    /// `POST /api/query`, `GET /api/courses`, and `GET /health`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest { path, clear } => {
            ingest::run_ingest(&cfg, path, clear).await?;
        }
        Commands::Query { question, session } => {
            run_query(&cfg, &question, session.as_deref()).await?;
        }
        Commands::Courses => {
            run_courses(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

/// One-off question answering against the hydrated index.
async fn run_query(
    cfg: &config::Config,
    question: &str,
    session: Option<&str>,
) -> anyhow::Result<()> {
    let rag = RagSystem::new(cfg)?;
    rag.hydrate(&cfg.ingest.docs_dir).await?;

    let outcome = rag.query(question, session).await?;

    println!("{}", outcome.answer);
    if !outcome.sources.is_empty() {
        println!();
        println!("sources:");
        for (i, source) in outcome.sources.iter().enumerate() {
            match &source.course_link {
                Some(link) => println!("  {}. {} ({})", i + 1, source.text, link),
                None => println!("  {}. {}", i + 1, source.text),
            }
        }
    }
    println!();
    println!("session: {}", outcome.session_id);

    Ok(())
}

async fn run_courses(cfg: &config::Config) -> anyhow::Result<()> {
    let rag = RagSystem::new(cfg)?;
    rag.hydrate(&cfg.ingest.docs_dir).await?;

    let analytics = rag.analytics().await;
    println!("courses: {}", analytics.total_courses);
    for title in &analytics.course_titles {
        println!("  {}", title);
    }

    Ok(())
}
