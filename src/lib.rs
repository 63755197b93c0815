//! # docsense
//!
//! A local-first document intelligence service.
//!
//! docsense ingests documents (PDF, plain text, scanned images), extracts
//! their text with per-page OCR fallback, chunks and embeds the text, and
//! answers questions over the indexed corpus with citation-grounded answers
//! and a confidence score. Everything lives in one SQLite file; the embedding,
//! OCR, and LLM capabilities are pluggable and all have offline defaults.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────────────┐   ┌──────────┐
//! │  Upload  │──▶│  Extract → Chunk → Embed  │──▶│  SQLite   │
//! │ PDF/txt/ │   │  (OCR fallback per page)  │   │ metadata  │
//! │  image   │   └───────────────────────────┘   │ + vectors │
//! └──────────┘                                   └────┬─────┘
//!                                                     │
//!                                 ┌───────────────────┤
//!                                 ▼                   ▼
//!                           ┌──────────┐       ┌──────────┐
//!                           │   CLI    │       │   HTTP   │
//!                           │(docsense)│       │  (/v1)   │
//!                           └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docsense init                          # create database
//! docsense ingest report.pdf             # ingest a document
//! docsense query "What was Q3 revenue?"  # ask a question
//! docsense serve                         # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | Text extraction with OCR fallback |
//! | [`chunk`] | Page-scoped sliding-window chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Durable vector index and consistency checks |
//! | [`store`] | Document/chunk/table metadata store |
//! | [`ingest`] | Pipeline orchestration |
//! | [`retrieve`] | Evidence retrieval |
//! | [`reason`] | Extractive and generative answering |
//! | [`validate`] | Citation grounding and confidence |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod ocr;
pub mod reason;
pub mod retrieve;
pub mod server;
pub mod store;
pub mod validate;
