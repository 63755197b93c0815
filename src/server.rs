//! HTTP API for uploads, document management, and querying.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/v1/documents` | Multipart upload; ingestion runs on a spawned task |
//! | `GET` | `/v1/documents` | List all documents with status |
//! | `GET` | `/v1/documents/{id}` | Per-document metadata |
//! | `GET` | `/v1/documents/{id}/chunks` | Stored chunks (text truncated) |
//! | `GET` | `/v1/documents/{id}/tables` | Detected tables |
//! | `DELETE` | `/v1/documents/{id}` | Cascade delete |
//! | `POST` | `/v1/query` | Ask a question over the indexed corpus |
//! | `GET` | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one JSON schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `unsupported_format` (400), `internal` (500).
//!
//! Upload acceptance is decoupled from ingestion: `POST /v1/documents`
//! answers as soon as the bytes are durably recorded, and the pipeline runs
//! on a spawned task. Poll `GET /v1/documents/{id}` for the outcome.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::ingest::{self, Pipeline, QueryRequest};
use crate::models::{DocumentStatus, QueryResult};
use crate::store;

/// Uploads larger than this are rejected before the handler runs.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Chunk text is truncated to this length in listings; full text stays in
/// the database for retrieval.
const CHUNK_PREVIEW_CHARS: usize = 200;

/// Starts the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(pipeline: Arc<Pipeline>) -> anyhow::Result<()> {
    let bind_addr = pipeline.config().server.bind.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/v1/documents", post(handle_upload).get(handle_list))
        .route(
            "/v1/documents/{id}",
            get(handle_detail).delete(handle_delete),
        )
        .route("/v1/documents/{id}/chunks", get(handle_chunks))
        .route("/v1/documents/{id}/tables", get(handle_tables))
        .route("/v1/query", post(handle_query))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(pipeline);

    println!("docsense server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn unsupported_format(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "unsupported_format".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ POST /v1/documents ============

/// JSON response body for an accepted upload.
#[derive(Serialize)]
struct UploadResponse {
    document_id: String,
    filename: String,
    status: DocumentStatus,
    message: String,
}

/// Handler for `POST /v1/documents`.
///
/// Expects one multipart field named `file` with a filename. The response is
/// sent as soon as the upload is recorded; extraction, chunking, embedding,
/// and indexing continue on a spawned task.
async fn handle_upload(
    State(pipeline): State<Arc<Pipeline>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("malformed multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let filename = field
                .file_name()
                .ok_or_else(|| bad_request("file field is missing a filename"))?
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;
            upload = Some((filename, bytes.to_vec()));
        }
    }

    let (filename, bytes) = upload.ok_or_else(|| bad_request("missing multipart field: file"))?;
    if crate::models::FileType::from_filename(&filename).is_none() {
        return Err(unsupported_format(format!(
            "unsupported file type: {}",
            filename
        )));
    }
    if bytes.is_empty() {
        return Err(bad_request("uploaded file is empty"));
    }

    let document_id = ingest::new_document_id();
    pipeline
        .register_upload(&document_id, &filename, &bytes)
        .await
        .map_err(|e| internal(e.to_string()))?;

    {
        let pipeline = pipeline.clone();
        let document_id = document_id.clone();
        let filename = filename.clone();
        tokio::spawn(async move {
            if let Err(e) = pipeline
                .process_document(&document_id, &filename, &bytes)
                .await
            {
                tracing::error!(document_id, error = %e, "background ingestion aborted");
            }
        });
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            document_id,
            filename,
            status: DocumentStatus::Uploaded,
            message: "upload accepted, ingestion in progress".to_string(),
        }),
    ))
}

// ============ GET /v1/documents ============

#[derive(Serialize)]
struct ListResponse {
    documents: Vec<DocumentSummary>,
    total: usize,
}

#[derive(Serialize)]
struct DocumentSummary {
    document_id: String,
    filename: String,
    status: DocumentStatus,
    page_count: i64,
    chunk_count: i64,
    created_at: i64,
}

/// Handler for `GET /v1/documents`. Newest first.
async fn handle_list(
    State(pipeline): State<Arc<Pipeline>>,
) -> Result<Json<ListResponse>, AppError> {
    let documents = store::list_documents(pipeline.pool())
        .await
        .map_err(|e| internal(e.to_string()))?;
    let summaries: Vec<DocumentSummary> = documents
        .into_iter()
        .map(|d| DocumentSummary {
            document_id: d.id,
            filename: d.filename,
            status: d.status,
            page_count: d.page_count,
            chunk_count: d.chunk_count,
            created_at: d.created_at,
        })
        .collect();
    let total = summaries.len();
    Ok(Json(ListResponse {
        documents: summaries,
        total,
    }))
}

// ============ GET /v1/documents/{id} ============

#[derive(Serialize)]
struct DocumentDetail {
    document_id: String,
    filename: String,
    status: DocumentStatus,
    failure_reason: Option<String>,
    extraction_method: Option<crate::models::ExtractionMethod>,
    page_count: i64,
    chunk_count: i64,
    created_at: i64,
}

/// Handler for `GET /v1/documents/{id}`. The status field is how clients
/// observe ingestion progress and failure reasons.
async fn handle_detail(
    State(pipeline): State<Arc<Pipeline>>,
    Path(id): Path<String>,
) -> Result<Json<DocumentDetail>, AppError> {
    let doc = store::get_document(pipeline.pool(), &id)
        .await
        .map_err(|e| internal(e.to_string()))?
        .ok_or_else(|| not_found(format!("document not found: {}", id)))?;
    Ok(Json(DocumentDetail {
        document_id: doc.id,
        filename: doc.filename,
        status: doc.status,
        failure_reason: doc.failure_reason,
        extraction_method: doc.extraction_method,
        page_count: doc.page_count,
        chunk_count: doc.chunk_count,
        created_at: doc.created_at,
    }))
}

// ============ GET /v1/documents/{id}/chunks ============

#[derive(Serialize)]
struct ChunksResponse {
    total: usize,
    chunks: Vec<ChunkPreview>,
}

#[derive(Serialize)]
struct ChunkPreview {
    chunk_id: String,
    page_index: i64,
    char_count: i64,
    text: String,
}

async fn handle_chunks(
    State(pipeline): State<Arc<Pipeline>>,
    Path(id): Path<String>,
) -> Result<Json<ChunksResponse>, AppError> {
    require_document(&pipeline, &id).await?;
    let chunks = store::chunks_for_document(pipeline.pool(), &id)
        .await
        .map_err(|e| internal(e.to_string()))?;
    let previews: Vec<ChunkPreview> = chunks
        .into_iter()
        .map(|c| ChunkPreview {
            chunk_id: c.id,
            page_index: c.page_index,
            char_count: c.char_count,
            text: c.text.chars().take(CHUNK_PREVIEW_CHARS).collect(),
        })
        .collect();
    Ok(Json(ChunksResponse {
        total: previews.len(),
        chunks: previews,
    }))
}

// ============ GET /v1/documents/{id}/tables ============

#[derive(Serialize)]
struct TablesResponse {
    total: usize,
    tables: Vec<crate::models::Table>,
}

async fn handle_tables(
    State(pipeline): State<Arc<Pipeline>>,
    Path(id): Path<String>,
) -> Result<Json<TablesResponse>, AppError> {
    require_document(&pipeline, &id).await?;
    let tables = store::tables_for_document(pipeline.pool(), &id)
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(TablesResponse {
        total: tables.len(),
        tables,
    }))
}

// ============ DELETE /v1/documents/{id} ============

#[derive(Serialize)]
struct DeleteResponse {
    document_id: String,
    deleted: bool,
}

async fn handle_delete(
    State(pipeline): State<Arc<Pipeline>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let deleted = pipeline
        .delete_document(&id)
        .await
        .map_err(|e| internal(e.to_string()))?;
    if !deleted {
        return Err(not_found(format!("document not found: {}", id)));
    }
    Ok(Json(DeleteResponse {
        document_id: id,
        deleted: true,
    }))
}

// ============ POST /v1/query ============

#[derive(Deserialize)]
struct QueryBody {
    question: String,
    top_k: Option<usize>,
    document_ids: Option<Vec<String>>,
    use_llm: Option<bool>,
}

/// Handler for `POST /v1/query`.
///
/// Validation failures (empty question, out-of-range `top_k`) are 400s.
/// Generation faults never surface here; they degrade to extractive answers
/// inside the pipeline.
async fn handle_query(
    State(pipeline): State<Arc<Pipeline>>,
    Json(body): Json<QueryBody>,
) -> Result<Json<QueryResult>, AppError> {
    let request = QueryRequest {
        question: body.question,
        top_k: body
            .top_k
            .unwrap_or(pipeline.config().retrieval.default_top_k),
        document_ids: body.document_ids,
        use_llm: body.use_llm.unwrap_or(true),
    };
    let result = pipeline.answer(&request).await.map_err(|e| {
        let msg = e.to_string();
        if msg.contains("must not be empty") || msg.contains("top_k") {
            bad_request(msg)
        } else {
            internal(msg)
        }
    })?;
    Ok(Json(result))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Handler for `GET /health`. Answers regardless of index state.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn require_document(pipeline: &Pipeline, id: &str) -> Result<(), AppError> {
    store::get_document(pipeline.pool(), id)
        .await
        .map_err(|e| internal(e.to_string()))?
        .ok_or_else(|| not_found(format!("document not found: {}", id)))?;
    Ok(())
}
