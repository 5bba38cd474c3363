//! # ragdesk CLI
//!
//! The `ragdesk` binary manages the document store and serves the chat API.
//!
//! ## Usage
//!
//! ```bash
//! ragdesk --config ./config/ragdesk.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragdesk init` | Create the SQLite index and run schema migrations |
//! | `ragdesk ingest <files...>` | Register and index local files |
//! | `ragdesk ask "<question>"` | Answer a question from the indexed documents |
//! | `ragdesk serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ragdesk::config;
use ragdesk::db;
use ragdesk::ingest::{upload_batch, UploadReport};
use ragdesk::registry::DocumentRegistry;
use ragdesk::retrieve;
use ragdesk::server;

/// ragdesk — a retrieval-augmented chat backend over local documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ragdesk.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ragdesk",
    about = "ragdesk — a retrieval-augmented chat backend over local documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragdesk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the index database.
    ///
    /// Creates the SQLite file and all required tables. Idempotent.
    Init,

    /// Register and index local files.
    ///
    /// Runs the same register → store → embed → index pipeline the HTTP
    /// upload endpoint uses, and prints the batch report.
    Ingest {
        /// Files to ingest.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Answer a question from the indexed documents.
    Ask {
        /// The question to answer.
        question: String,
    },

    /// Start the HTTP server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// document and chat endpoints.
    Serve,
}

fn print_report(report: &UploadReport) {
    println!("Newly ingested:   {}", report.newly_ingested.len());
    for name in &report.newly_ingested {
        println!("  + {}", name);
    }
    println!("Already ingested: {}", report.already_ingested.len());
    for name in &report.already_ingested {
        println!("  = {}", name);
    }
    println!("Skipped (size):   {}", report.skipped_too_large.len());
    for name in &report.skipped_too_large {
        println!("  ! {}", name);
    }
    println!("Failed:           {}", report.failed.len());
    for name in &report.failed {
        println!("  x {}", name);
    }
    println!("Registry total:   {}", report.total_registry);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            db::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { files } => {
            let pool = db::connect(&cfg).await?;
            db::run_migrations(&pool).await?;
            let registry = DocumentRegistry::new(&cfg.storage);

            let mut batch = Vec::new();
            for path in files {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.display().to_string());
                let bytes = std::fs::read(&path)
                    .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
                batch.push((name, bytes));
            }

            let report = upload_batch(&cfg, &pool, &registry, batch).await?;
            print_report(&report);
        }
        Commands::Ask { question } => {
            let pool = db::connect(&cfg).await?;
            db::run_migrations(&pool).await?;
            let answer = retrieve::answer(&cfg, &pool, &question, "").await?;
            println!("{}", answer);
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
