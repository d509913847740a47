#![deny(missing_docs)]

//! Core library for the document ingestion worker.

/// Health and metrics probe endpoints.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Document metadata lookup, retrieval, and text extraction.
pub mod documents;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion metrics helpers.
pub mod metrics;
/// Document processing pipeline.
pub mod processing;
/// Qdrant vector store integration.
pub mod qdrant;
/// Job queue binding and message lifecycle.
pub mod queue;
