//! # pdfchat CLI
//!
//! The `pdfchat` binary ingests PDFs into a local index and answers
//! questions about them, either from the terminal or over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! pdfchat --config ./config/pdfchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pdfchat init` | Create the SQLite database and run schema migrations |
//! | `pdfchat ingest <paths>...` | Load, chunk, and index PDF files or directories |
//! | `pdfchat ask "<question>"` | Stream an answer as NDJSON events |
//! | `pdfchat history` | Print a conversation's turns |
//! | `pdfchat reset` | Delete every indexed chunk |
//! | `pdfchat serve` | Start the HTTP server |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `pdfchat=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pdfchat::chat::CONVERSATION_KEY;
use pdfchat::{chat, config, ingest, migrate, server};
use pdfchat_core::models::ExtraMetadata;

/// Chat with your PDFs.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/pdfchat.example.toml`.
#[derive(Parser)]
#[command(
    name = "pdfchat",
    about = "Chat with PDF documents using retrieval-augmented generation",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pdfchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it on an existing database is safe.
    Init,

    /// Ingest PDF files.
    ///
    /// Directories are searched recursively for `*.pdf`. Pages with too
    /// little text are run through OCR. Chunks that are already indexed
    /// are skipped.
    Ingest {
        /// Files or directories to ingest.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Conversation that may retrieve these documents.
        #[arg(long, default_value = "default")]
        conversation: String,

        /// Uploading user, stored as chunk metadata.
        #[arg(long)]
        user: Option<String>,
    },

    /// Ask a question and stream the answer.
    Ask {
        question: String,

        #[arg(long, default_value = "default")]
        conversation: String,
    },

    /// Show the stored turns of a conversation.
    History {
        #[arg(long, default_value = "default")]
        conversation: String,

        /// Show at most this many of the latest turns.
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },

    /// Remove every indexed chunk.
    Reset,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pdfchat=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            paths,
            conversation,
            user,
        } => {
            let mut metadata = ExtraMetadata::new();
            metadata.insert(CONVERSATION_KEY.to_string(), conversation);
            if let Some(user) = user {
                metadata.insert("user_id".to_string(), user);
            }
            ingest::run_ingest(&cfg, &paths, metadata).await?;
        }
        Commands::Ask {
            question,
            conversation,
        } => {
            chat::run_ask(&cfg, &conversation, &question).await?;
        }
        Commands::History {
            conversation,
            limit,
        } => {
            chat::run_history(&cfg, &conversation, limit).await?;
        }
        Commands::Reset => {
            ingest::run_reset(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
