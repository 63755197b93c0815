//! Durable vector index over SQLite.
//!
//! One `index_entries` row per live chunk: `chunk_id → embedding` (little-
//! endian f32 BLOB) plus the owning `document_id` for filtered search and
//! cascade removal. The table is the persistence format — on restart the
//! index is simply the table, no rebuild step.
//!
//! Writes for a document happen inside the caller's transaction (see
//! [`crate::store`]) so that a document's chunks and index entries become
//! visible atomically; `search` reads a consistent snapshot and never
//! observes a half-inserted or half-removed document.
//!
//! Search is exact k-nearest-neighbor by cosine similarity, computed in Rust
//! over all candidate rows (the corpus sizes this system targets make a flat
//! scan the right trade).

use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::IndexError;

/// A scored search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk_id: String,
    pub document_id: String,
    pub score: f64,
}

/// Handle over the durable index table.
#[derive(Clone)]
pub struct VectorIndex {
    pool: SqlitePool,
}

impl VectorIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert entries for a document within an open transaction.
    pub async fn insert_entries(
        conn: &mut SqliteConnection,
        document_id: &str,
        entries: &[(String, Vec<f32>)],
    ) -> Result<(), IndexError> {
        for (chunk_id, vector) in entries {
            sqlx::query(
                "INSERT INTO index_entries (chunk_id, document_id, embedding) VALUES (?, ?, ?)",
            )
            .bind(chunk_id)
            .bind(document_id)
            .bind(vec_to_blob(vector))
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Remove a document's entries within an open transaction.
    pub async fn remove_entries(
        conn: &mut SqliteConnection,
        document_id: &str,
    ) -> Result<u64, IndexError> {
        let result = sqlx::query("DELETE FROM index_entries WHERE document_id = ?")
            .bind(document_id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// k-nearest-neighbor search by cosine similarity, score descending,
    /// ties broken by ascending chunk_id. An empty index or a filter that
    /// matches nothing returns an empty list, not an error.
    pub async fn search(
        &self,
        query: &[f32],
        k: usize,
        document_filter: Option<&[String]>,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let rows = match document_filter {
            Some(ids) if ids.is_empty() => Vec::new(),
            Some(ids) => {
                let placeholders = vec!["?"; ids.len()].join(", ");
                let sql = format!(
                    "SELECT chunk_id, document_id, embedding FROM index_entries \
                     WHERE document_id IN ({})",
                    placeholders
                );
                let mut q = sqlx::query(&sql);
                for id in ids {
                    q = q.bind(id);
                }
                q.fetch_all(&self.pool).await?
            }
            None => {
                sqlx::query("SELECT chunk_id, document_id, embedding FROM index_entries")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let mut hits: Vec<SearchHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                SearchHit {
                    chunk_id: row.get("chunk_id"),
                    document_id: row.get("document_id"),
                    score: cosine_similarity(query, &vector) as f64,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);

        Ok(hits)
    }

    /// Total number of live index entries.
    pub async fn entry_count(&self) -> Result<i64, IndexError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM index_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// A divergence between the index and the metadata store.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsistencyFault {
    /// Index entry whose chunk no longer exists.
    OrphanedEntry { chunk_id: String },
    /// Indexed document's chunk with no index entry.
    MissingEntry { chunk_id: String },
}

impl std::fmt::Display for ConsistencyFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsistencyFault::OrphanedEntry { chunk_id } => {
                write!(f, "index entry without metadata: {}", chunk_id)
            }
            ConsistencyFault::MissingEntry { chunk_id } => {
                write!(f, "chunk without index entry: {}", chunk_id)
            }
        }
    }
}

/// Cross-check `index_entries` against `chunks` in both directions.
///
/// The index store and the metadata store must never diverge silently: an
/// entry with no chunk, or a chunk of an `indexed` document with no entry,
/// is reported as a fault for the operator to act on.
pub async fn verify_consistency(pool: &SqlitePool) -> Result<Vec<ConsistencyFault>, IndexError> {
    let mut faults = Vec::new();

    let orphaned: Vec<String> = sqlx::query_scalar(
        "SELECT chunk_id FROM index_entries \
         WHERE chunk_id NOT IN (SELECT id FROM chunks) ORDER BY chunk_id",
    )
    .fetch_all(pool)
    .await?;
    for chunk_id in orphaned {
        faults.push(ConsistencyFault::OrphanedEntry { chunk_id });
    }

    let missing: Vec<String> = sqlx::query_scalar(
        "SELECT c.id FROM chunks c \
         JOIN documents d ON d.id = c.document_id \
         WHERE d.status = 'indexed' \
           AND c.id NOT IN (SELECT chunk_id FROM index_entries) \
         ORDER BY c.id",
    )
    .fetch_all(pool)
    .await?;
    for chunk_id in missing {
        faults.push(ConsistencyFault::MissingEntry { chunk_id });
    }

    Ok(faults)
}
