//! Pipeline orchestration: the ingestion state machine and the query path.
//!
//! [`Pipeline`] owns the capability handles (OCR, embedding, LLM) plus the
//! database pool, and is shared by the CLI and the HTTP server. Ingestion
//! walks a document through `uploaded → extracting → chunking → embedding →
//! indexed`, where the final flip to `indexed` commits chunks, tables, and
//! index entries in one transaction. Any error moves the document to `failed`
//! with the reason retained; no other document is affected.

use std::path::PathBuf;

use anyhow::Result;
use sqlx::SqlitePool;

use crate::chunk;
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{ChunkingError, IngestError};
use crate::extract;
use crate::index::VectorIndex;
use crate::models::{Chunk, DocumentStatus, FileType, QueryResult, Table};
use crate::ocr::OcrEngine;
use crate::reason::{self, ReasoningEngine};
use crate::retrieve::Retriever;
use crate::store;
use crate::validate;

/// Parameters of one query, after HTTP/CLI-level parsing.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub question: String,
    pub top_k: usize,
    /// Restrict retrieval to these document ids. `None` means all documents.
    pub document_ids: Option<Vec<String>>,
    pub use_llm: bool,
}

pub struct Pipeline {
    pool: SqlitePool,
    config: Config,
    index: VectorIndex,
    ocr: Box<dyn OcrEngine>,
    embedder: Box<dyn EmbeddingProvider>,
    reasoner: ReasoningEngine,
}

impl Pipeline {
    /// Wire up all capabilities from configuration.
    pub fn new(pool: SqlitePool, config: Config) -> Result<Self> {
        let ocr = crate::ocr::create_engine(&config.ocr)?;
        let embedder = embedding::create_provider(&config.embedding)?;
        let llm = reason::create_client(&config.llm)?;
        let reasoner = ReasoningEngine::new(llm, config.llm.clone());
        let index = VectorIndex::new(pool.clone());
        Ok(Self {
            pool,
            config,
            index,
            ocr,
            embedder,
            reasoner,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Record an upload: the document row in `uploaded` state plus the raw
    /// bytes on disk. Processing happens separately so callers can
    /// acknowledge the upload before the pipeline runs.
    pub async fn register_upload(
        &self,
        document_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<(), IngestError> {
        store::create_document(&self.pool, document_id, filename).await?;
        if let Err(e) = self.persist_upload(document_id, filename, bytes).await {
            // Never leave the document stuck in `uploaded` with no reason
            store::fail_document(&self.pool, document_id, &e.to_string()).await?;
            return Err(e);
        }
        Ok(())
    }

    /// Run the pipeline stages on a registered upload. The document ends in
    /// `indexed` or `failed`; this function itself only errors when even
    /// recording the failure was impossible.
    pub async fn process_document(
        &self,
        document_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<(), IngestError> {
        match self.run_stages(document_id, filename, bytes).await {
            Ok(()) => {
                tracing::info!(document_id, filename, "document indexed");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(document_id, filename, error = %e, "ingestion failed");
                store::fail_document(&self.pool, document_id, &e.to_string()).await?;
                Ok(())
            }
        }
    }

    /// Register and process in one call. The synchronous path used by the
    /// CLI; the server registers first and processes in the background.
    pub async fn ingest_document(
        &self,
        document_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<(), IngestError> {
        self.register_upload(document_id, filename, bytes).await?;
        self.process_document(document_id, filename, bytes).await
    }

    async fn run_stages(
        &self,
        document_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<(), IngestError> {
        store::set_status(&self.pool, document_id, DocumentStatus::Extracting).await?;
        let extracted = extract::extract_pages(
            bytes,
            FileType::from_filename(filename),
            filename,
            &self.config.extraction,
            self.ocr.as_ref(),
            &self.config.ocr.language,
        )
        .await?;

        store::set_status(&self.pool, document_id, DocumentStatus::Chunking).await?;
        let chunks = chunk::chunk_pages(document_id, &extracted.pages, &self.config.chunking);
        if chunks.is_empty() {
            return Err(ChunkingError::DegenerateInput.into());
        }

        store::set_status(&self.pool, document_id, DocumentStatus::Embedding).await?;
        let entries = self.embed_chunks(&chunks).await?;

        let tables: Vec<Table> = extracted
            .tables
            .iter()
            .enumerate()
            .map(|(i, (page_index, rows))| Table {
                id: format!("{}:t{:04}", document_id, i),
                document_id: document_id.to_string(),
                page_index: *page_index,
                rows: rows.clone(),
            })
            .collect();

        store::commit_indexed(
            &self.pool,
            document_id,
            extracted.method,
            extracted.pages.len() as i64,
            &chunks,
            &tables,
            &entries,
        )
        .await
    }

    /// Embed chunk texts in configured batches, pairing each vector with its
    /// chunk id.
    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<(String, Vec<f32>)>, IngestError> {
        let batch_size = self.config.embedding.batch_size.max(1);
        let mut entries = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            for (chunk, vector) in batch.iter().zip(vectors) {
                entries.push((chunk.id.clone(), vector));
            }
        }
        Ok(entries)
    }

    async fn persist_upload(
        &self,
        document_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<(), IngestError> {
        let dir = &self.config.storage.upload_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| IngestError::Store(format!("create upload dir: {}", e)))?;
        let path = upload_path(dir, document_id, filename);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| IngestError::Store(format!("write upload: {}", e)))?;
        Ok(())
    }

    /// Answer a question end to end: retrieve, reason, validate.
    pub async fn answer(&self, request: &QueryRequest) -> Result<QueryResult> {
        if request.question.trim().is_empty() {
            anyhow::bail!("question must not be empty");
        }
        let max_top_k = self.config.retrieval.max_top_k;
        if request.top_k == 0 || request.top_k > max_top_k {
            anyhow::bail!("top_k must be between 1 and {}", max_top_k);
        }

        let retriever = Retriever {
            pool: &self.pool,
            index: &self.index,
            provider: self.embedder.as_ref(),
            snippet_chars: self.config.retrieval.snippet_chars,
        };
        let evidence = retriever
            .retrieve(
                &request.question,
                request.top_k,
                request.document_ids.as_deref(),
            )
            .await?;

        let draft = self
            .reasoner
            .answer(&request.question, &evidence, request.use_llm)
            .await;

        Ok(validate::finalize(
            draft,
            evidence,
            self.config.llm.max_answer_chars,
        ))
    }

    /// Delete a document and its stored upload. Returns false when unknown.
    pub async fn delete_document(&self, document_id: &str) -> Result<bool, IngestError> {
        let Some(doc) = store::get_document(&self.pool, document_id).await? else {
            return Ok(false);
        };
        let deleted = store::delete_document(&self.pool, document_id).await?;
        if deleted {
            let path = upload_path(&self.config.storage.upload_dir, document_id, &doc.filename);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(document_id, error = %e, "failed to remove stored upload");
                }
            }
        }
        Ok(deleted)
    }
}

fn upload_path(dir: &std::path::Path, document_id: &str, filename: &str) -> PathBuf {
    // Prefix with the id so two uploads of the same filename never collide,
    // and strip any path components a client smuggled into the filename.
    let safe_name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    dir.join(format!("{}_{}", document_id, safe_name))
}

/// Fresh v4 document id.
pub fn new_document_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
