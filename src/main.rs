//! # docsense CLI
//!
//! The `docsense` binary is the primary interface for the document
//! intelligence service. It provides commands for database initialization,
//! document ingestion, querying, document management, index consistency
//! checks, and starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! docsense --config ./config/docsense.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docsense init` | Create the SQLite database and run schema migrations |
//! | `docsense ingest <path>` | Ingest a document file (PDF, txt, md, image) |
//! | `docsense list` | List all documents with status |
//! | `docsense query "<question>"` | Ask a question over the indexed corpus |
//! | `docsense delete <id>` | Delete a document and everything derived from it |
//! | `docsense check` | Verify index/metadata consistency |
//! | `docsense serve` | Start the HTTP API server |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use docsense::ingest::{self, Pipeline, QueryRequest};
use docsense::models::DocumentStatus;
use docsense::{config, db, index, migrate, server, store};

/// docsense — document ingestion, vector indexing, and citation-grounded
/// question answering over a local SQLite database.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docsense.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docsense",
    about = "docsense — document intelligence: ingestion, indexing, and grounded question answering",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docsense.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (documents,
    /// chunks, doc_tables, index_entries). Idempotent.
    Init,

    /// Ingest a document file.
    ///
    /// Runs the full pipeline synchronously: extraction (with OCR fallback
    /// for scanned pages), chunking, embedding, and indexing. Prints the
    /// final status; a failed document stays in the store with its reason.
    Ingest {
        /// Path to the document (.pdf, .txt, .md, .png, .jpg, .jpeg, .tiff).
        path: PathBuf,
    },

    /// List all documents with their ingestion status.
    List,

    /// Ask a question over the indexed corpus.
    ///
    /// Prints the answer, confidence, citations, and the supporting
    /// evidence snippets with similarity scores.
    Query {
        /// The question to answer.
        question: String,

        /// Number of evidence chunks to retrieve.
        #[arg(long)]
        top_k: Option<usize>,

        /// Restrict retrieval to specific document ids (repeatable).
        #[arg(long = "document")]
        documents: Vec<String>,

        /// Answer extractively even when an LLM is configured.
        #[arg(long)]
        no_llm: bool,
    },

    /// Delete a document, its chunks, tables, and index entries.
    Delete {
        /// Document id.
        id: String,
    },

    /// Verify that the vector index and the metadata store agree.
    ///
    /// Reports orphaned index entries and indexed chunks missing from the
    /// index. Exits non-zero when any fault is found.
    Check,

    /// Start the HTTP API server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("docsense=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { path } => {
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .context("path has no usable filename")?
                .to_string();
            let bytes = std::fs::read(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;

            let pool = db::connect(&cfg).await?;
            let pipeline = Pipeline::new(pool, cfg)?;
            let document_id = ingest::new_document_id();
            pipeline
                .ingest_document(&document_id, &filename, &bytes)
                .await?;

            let doc = store::get_document(pipeline.pool(), &document_id)
                .await?
                .context("document vanished after ingestion")?;
            match doc.status {
                DocumentStatus::Indexed => {
                    println!(
                        "Indexed {} ({} pages, {} chunks, method: {})",
                        document_id,
                        doc.page_count,
                        doc.chunk_count,
                        doc.extraction_method.map(|m| m.as_str()).unwrap_or("?")
                    );
                }
                _ => {
                    println!(
                        "Ingestion failed for {}: {}",
                        document_id,
                        doc.failure_reason.as_deref().unwrap_or("unknown")
                    );
                    std::process::exit(1);
                }
            }
        }
        Commands::List => {
            let pool = db::connect(&cfg).await?;
            let documents = store::list_documents(&pool).await?;
            if documents.is_empty() {
                println!("No documents.");
                return Ok(());
            }
            for doc in documents {
                let date = chrono::DateTime::from_timestamp(doc.created_at, 0)
                    .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!(
                    "{}  {:10}  {:3} pages  {:4} chunks  {}  {}",
                    doc.id,
                    doc.status.as_str(),
                    doc.page_count,
                    doc.chunk_count,
                    date,
                    doc.filename
                );
                if let Some(reason) = doc.failure_reason {
                    println!("    reason: {}", reason);
                }
            }
        }
        Commands::Query {
            question,
            top_k,
            documents,
            no_llm,
        } => {
            let pool = db::connect(&cfg).await?;
            let default_top_k = cfg.retrieval.default_top_k;
            let pipeline = Pipeline::new(pool, cfg)?;
            let result = pipeline
                .answer(&QueryRequest {
                    question,
                    top_k: top_k.unwrap_or(default_top_k),
                    document_ids: if documents.is_empty() {
                        None
                    } else {
                        Some(documents)
                    },
                    use_llm: !no_llm,
                })
                .await?;

            println!("{}", result.answer);
            println!();
            println!("confidence: {:.2}", result.confidence);
            if !result.citations.is_empty() {
                let ids: Vec<&str> =
                    result.citations.iter().map(|c| c.chunk_id.as_str()).collect();
                println!("citations: {}", ids.join(", "));
            }
            if result.evidence.is_empty() {
                println!("No evidence.");
            }
            for (i, ev) in result.evidence.iter().enumerate() {
                println!();
                println!(
                    "{}. [{:.2}] {} (page {})",
                    i + 1,
                    ev.score,
                    ev.filename,
                    ev.page_index + 1
                );
                println!("    excerpt: \"{}\"", ev.snippet.replace('\n', " "));
                println!("    id: {}", ev.chunk_id);
            }
        }
        Commands::Delete { id } => {
            let pool = db::connect(&cfg).await?;
            let pipeline = Pipeline::new(pool, cfg)?;
            if pipeline.delete_document(&id).await? {
                println!("Deleted {}.", id);
            } else {
                println!("Document not found: {}", id);
                std::process::exit(1);
            }
        }
        Commands::Check => {
            let pool = db::connect(&cfg).await?;
            let faults = index::verify_consistency(&pool).await?;
            if faults.is_empty() {
                println!("Index and metadata store are consistent.");
            } else {
                for fault in &faults {
                    println!("{}", fault);
                }
                println!("{} fault(s) found.", faults.len());
                std::process::exit(1);
            }
        }
        Commands::Serve => {
            migrate::run_migrations(&cfg).await?;
            let pool = db::connect(&cfg).await?;
            let pipeline = Arc::new(Pipeline::new(pool, cfg)?);
            server::run_server(pipeline).await?;
        }
    }

    Ok(())
}
