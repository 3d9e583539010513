#![deny(missing_docs)]

//! Ragdesk: grounded question answering over your own documents.
//!
//! Documents are split into chunks, embedded, and stored in a local vector index. Questions are
//! answered by a language model that only sees the passages retrieved for them.

/// Retrieval-augmented question answering.
pub mod answer;
/// Directory-wide batch runs.
pub mod batch;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Durable vector index.
pub mod index;
/// Language model client abstraction and adapters.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Session activity counters.
pub mod metrics;
/// Document loading, chunking, and the ingestion pipeline.
pub mod processing;
/// Progress events emitted by long-running work.
pub mod progress;
/// The interactive session.
pub mod session;
