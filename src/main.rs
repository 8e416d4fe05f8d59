use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod config;
mod embeddings;
mod ingest;
mod llm;
mod pdf;
mod query;
mod splitter;
mod store;
mod text;

use config::Config;

#[derive(Parser)]
#[command(
    name = "legis-rag",
    version,
    about = "Local RAG engine for legal and legislative PDF documents"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest PDFs from the documents directory into the vector index
    Ingest {
        /// Wipe the persisted index before ingesting
        #[arg(long)]
        reset: bool,
    },
    /// Answer a question from the ingested corpus
    Query {
        /// The question text
        query_text: String,
        /// Number of chunks used as context (default from TOP_K)
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Dump the persisted index, or run a raw similarity search against it
    Inspect {
        /// Similarity query to run instead of dumping chunks
        #[arg(long)]
        query: Option<String>,
        /// Maximum number of chunks to print
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn get_log_level() -> String {
    std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
}

fn setup_logging() -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(get_log_level()));

    // User-facing output goes to stdout; diagnostics stay on stderr unless
    // a log directory is configured, in which case they go to a JSON file.
    match std::env::var("LOG_DIR") {
        Ok(log_dir) => {
            std::fs::create_dir_all(&log_dir)?;
            let log_file = format!("{log_dir}/legis-rag.log");
            let file_appender = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_file)?;

            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(file_appender)
                .json()
                .init();
            tracing::info!("Logging to {}", log_file);
        }
        Err(_) => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .compact()
                .init();
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenv::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: could not load .env file: {e}");
        }
    }
    setup_logging()?;

    let cli = Cli::parse();
    let config = Config::from_env();

    tracing::debug!(?config, "Resolved configuration");

    match cli.command {
        Command::Ingest { reset } => ingest::run(&config, reset).await,
        Command::Query { query_text, top_k } => {
            let top_k = top_k.unwrap_or(config.top_k).max(1);
            query::run(&config, &query_text, top_k).await
        }
        Command::Inspect { query, limit } => {
            query::inspect(&config, query.as_deref(), limit).await
        }
    }
}
