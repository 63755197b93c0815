//! Evidence retrieval: embed the question, search the index, join metadata.
//!
//! The retriever is read-only. A filter that excludes every indexed chunk, or
//! an empty index, yields an empty evidence list rather than an error.

use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::embedding::{self, EmbeddingProvider};
use crate::index::VectorIndex;
use crate::models::{snippet_of, Evidence};
use crate::store;

pub struct Retriever<'a> {
    pub pool: &'a SqlitePool,
    pub index: &'a VectorIndex,
    pub provider: &'a dyn EmbeddingProvider,
    pub snippet_chars: usize,
}

impl Retriever<'_> {
    /// Ranked evidence for a question, score descending.
    pub async fn retrieve(
        &self,
        question: &str,
        top_k: usize,
        document_filter: Option<&[String]>,
    ) -> Result<Vec<Evidence>> {
        let query_vec = embedding::embed_query(self.provider, question).await?;
        let hits = self.index.search(&query_vec, top_k, document_filter).await?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let chunk_ids: Vec<String> = hits.iter().map(|h| h.chunk_id.clone()).collect();
        let metadata = store::chunk_metadata(self.pool, &chunk_ids).await?;
        let by_id: HashMap<&str, &(crate::models::Chunk, String)> = metadata
            .iter()
            .map(|entry| (entry.0.id.as_str(), entry))
            .collect();

        // Preserve the index's ranking; a hit with no metadata row is a
        // consistency fault surfaced by `index::verify_consistency`, here it
        // is skipped so one bad row cannot take down the query path.
        let mut evidence = Vec::with_capacity(hits.len());
        for hit in &hits {
            let Some((chunk, filename)) = by_id.get(hit.chunk_id.as_str()) else {
                tracing::warn!(chunk_id = %hit.chunk_id, "index hit without chunk metadata");
                continue;
            };
            evidence.push(Evidence {
                chunk_id: chunk.id.clone(),
                document_id: chunk.document_id.clone(),
                filename: filename.clone(),
                page_index: chunk.page_index,
                snippet: snippet_of(&chunk.text, self.snippet_chars),
                score: hit.score,
            });
        }

        Ok(evidence)
    }
}
