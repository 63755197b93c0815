//! Metadata store: documents, chunks, and tables in SQLite.
//!
//! The store owns every mutation of a [`Document`]. Status only moves through
//! the ingestion state machine (`uploaded → extracting → chunking → embedding
//! → indexed | failed`); terminal states are never overwritten.
//!
//! [`commit_indexed`] and [`delete_document`] are the two multi-table writes.
//! Both run in a single transaction together with the vector index rows, so a
//! concurrent reader sees a document's chunks and index entries all-or-nothing
//! and the `index entries == live chunks` invariant holds at every observable
//! point.

use sqlx::{Row, SqlitePool};

use crate::error::IngestError;
use crate::index::VectorIndex;
use crate::models::{Chunk, Document, DocumentStatus, ExtractionMethod, Table};

/// Insert a fresh document in `uploaded` state.
pub async fn create_document(
    pool: &SqlitePool,
    id: &str,
    filename: &str,
) -> Result<Document, IngestError> {
    let created_at = chrono::Utc::now().timestamp();
    sqlx::query(
        "INSERT INTO documents (id, filename, status, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(id)
    .bind(filename)
    .bind(DocumentStatus::Uploaded.as_str())
    .bind(created_at)
    .execute(pool)
    .await?;

    Ok(Document {
        id: id.to_string(),
        filename: filename.to_string(),
        status: DocumentStatus::Uploaded,
        failure_reason: None,
        extraction_method: None,
        page_count: 0,
        chunk_count: 0,
        created_at,
    })
}

/// Advance a document to a non-terminal pipeline state.
pub async fn set_status(
    pool: &SqlitePool,
    document_id: &str,
    status: DocumentStatus,
) -> Result<(), IngestError> {
    sqlx::query(
        "UPDATE documents SET status = ? \
         WHERE id = ? AND status NOT IN ('indexed', 'failed')",
    )
    .bind(status.as_str())
    .bind(document_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Move a document to `failed`, retaining the reason for inspection.
pub async fn fail_document(
    pool: &SqlitePool,
    document_id: &str,
    reason: &str,
) -> Result<(), IngestError> {
    sqlx::query(
        "UPDATE documents SET status = 'failed', failure_reason = ? \
         WHERE id = ? AND status != 'indexed'",
    )
    .bind(reason)
    .bind(document_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Commit a fully ingested document: chunk rows, table rows, index entries,
/// and the `indexed` status flip, all in one transaction.
pub async fn commit_indexed(
    pool: &SqlitePool,
    document_id: &str,
    method: ExtractionMethod,
    page_count: i64,
    chunks: &[Chunk],
    tables: &[Table],
    entries: &[(String, Vec<f32>)],
) -> Result<(), IngestError> {
    let mut tx = pool.begin().await?;

    for chunk in chunks {
        sqlx::query(
            "INSERT INTO chunks (id, document_id, page_index, text, char_count) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.page_index)
        .bind(&chunk.text)
        .bind(chunk.char_count)
        .execute(&mut *tx)
        .await?;
    }

    for table in tables {
        let rows_json = serde_json::to_string(&table.rows)
            .map_err(|e| IngestError::Store(e.to_string()))?;
        sqlx::query(
            "INSERT INTO doc_tables (id, document_id, page_index, rows_json) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&table.id)
        .bind(&table.document_id)
        .bind(table.page_index)
        .bind(rows_json)
        .execute(&mut *tx)
        .await?;
    }

    VectorIndex::insert_entries(&mut *tx, document_id, entries).await?;

    sqlx::query(
        "UPDATE documents SET status = 'indexed', extraction_method = ?, \
         page_count = ?, chunk_count = ? WHERE id = ?",
    )
    .bind(method.as_str())
    .bind(page_count)
    .bind(chunks.len() as i64)
    .bind(document_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Delete a document and everything derived from it in one transaction.
/// Returns false when the document does not exist.
pub async fn delete_document(pool: &SqlitePool, document_id: &str) -> Result<bool, IngestError> {
    let mut tx = pool.begin().await?;

    VectorIndex::remove_entries(&mut *tx, document_id).await?;

    sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM doc_tables WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

pub async fn get_document(
    pool: &SqlitePool,
    document_id: &str,
) -> Result<Option<Document>, IngestError> {
    let row = sqlx::query(
        "SELECT id, filename, status, failure_reason, extraction_method, \
         page_count, chunk_count, created_at FROM documents WHERE id = ?",
    )
    .bind(document_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(row_to_document))
}

/// All documents, newest first.
pub async fn list_documents(pool: &SqlitePool) -> Result<Vec<Document>, IngestError> {
    let rows = sqlx::query(
        "SELECT id, filename, status, failure_reason, extraction_method, \
         page_count, chunk_count, created_at FROM documents \
         ORDER BY created_at DESC, id ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(row_to_document).collect())
}

fn row_to_document(row: sqlx::sqlite::SqliteRow) -> Document {
    let status: String = row.get("status");
    let method: Option<String> = row.get("extraction_method");
    Document {
        id: row.get("id"),
        filename: row.get("filename"),
        status: DocumentStatus::parse(&status).unwrap_or(DocumentStatus::Failed),
        failure_reason: row.get("failure_reason"),
        extraction_method: method.as_deref().and_then(ExtractionMethod::parse),
        page_count: row.get("page_count"),
        chunk_count: row.get("chunk_count"),
        created_at: row.get("created_at"),
    }
}

/// A document's chunks in id order (which is ingestion order).
pub async fn chunks_for_document(
    pool: &SqlitePool,
    document_id: &str,
) -> Result<Vec<Chunk>, IngestError> {
    let rows = sqlx::query(
        "SELECT id, document_id, page_index, text, char_count \
         FROM chunks WHERE document_id = ? ORDER BY id ASC",
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Chunk {
            id: row.get("id"),
            document_id: row.get("document_id"),
            page_index: row.get("page_index"),
            text: row.get("text"),
            char_count: row.get("char_count"),
        })
        .collect())
}

/// Join chunk metadata (text, page, owning document's filename) for a set of
/// chunk ids. Missing ids are silently absent from the result.
pub async fn chunk_metadata(
    pool: &SqlitePool,
    chunk_ids: &[String],
) -> Result<Vec<(Chunk, String)>, IngestError> {
    if chunk_ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; chunk_ids.len()].join(", ");
    let sql = format!(
        "SELECT c.id, c.document_id, c.page_index, c.text, c.char_count, d.filename \
         FROM chunks c JOIN documents d ON d.id = c.document_id \
         WHERE c.id IN ({})",
        placeholders
    );
    let mut q = sqlx::query(&sql);
    for id in chunk_ids {
        q = q.bind(id);
    }
    let rows = q.fetch_all(pool).await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            (
                Chunk {
                    id: row.get("id"),
                    document_id: row.get("document_id"),
                    page_index: row.get("page_index"),
                    text: row.get("text"),
                    char_count: row.get("char_count"),
                },
                row.get("filename"),
            )
        })
        .collect())
}

pub async fn tables_for_document(
    pool: &SqlitePool,
    document_id: &str,
) -> Result<Vec<Table>, IngestError> {
    let rows = sqlx::query(
        "SELECT id, document_id, page_index, rows_json \
         FROM doc_tables WHERE document_id = ? ORDER BY id ASC",
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?;

    let mut tables = Vec::with_capacity(rows.len());
    for row in rows {
        let rows_json: String = row.get("rows_json");
        let parsed: Vec<Vec<String>> = serde_json::from_str(&rows_json)
            .map_err(|e| IngestError::Store(e.to_string()))?;
        tables.push(Table {
            id: row.get("id"),
            document_id: row.get("document_id"),
            page_index: row.get("page_index"),
            rows: parsed,
        });
    }
    Ok(tables)
}
