//! Core data types and error definitions for the ingestion pipeline.

use crate::documents::{FetchError, MetadataError};
use crate::embedding::EmbeddingError;
use crate::qdrant::{CollectionProvisionError, StorageWriteError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Job published for every uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Identifier of the document in the metadata store.
    pub document_id: String,
    /// Tenant that owns the document.
    pub bot_id: String,
    /// User that uploaded the document.
    pub user_id: String,
}

/// Text of one page of a fetched document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    /// Extracted text; may be empty for image-only pages.
    pub text: String,
    /// 1-indexed page number.
    pub page_number: u32,
    /// Storage key the document was fetched from.
    pub source_key: String,
    /// Number of pages in the document.
    pub total_pages: u32,
}

/// Bounded text segment of a document; the unit of embedding and storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Chunk text including the overlap carried from the previous chunk.
    pub text: String,
    /// Page the chunk was cut from.
    pub page_number: u32,
    /// 0-indexed position within the document.
    pub chunk_index: usize,
    /// Document the chunk belongs to.
    pub source_document_id: String,
}

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// Chunk size must allow at least one character.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap must be strictly smaller than the chunk size.
    #[error("chunk overlap {overlap} must be smaller than chunk size {chunk_size}")]
    InvalidOverlap {
        /// Requested chunk size.
        chunk_size: usize,
        /// Requested overlap.
        overlap: usize,
    },
}

/// Errors emitted by the ingestion pipeline for one job.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The document is unknown to the metadata store or the document store.
    #[error("document not found: {0}")]
    NotFound(String),
    /// The document cannot be ingested as-is (empty text, tenant mismatch, bad settings).
    #[error("validation failed: {0}")]
    Validation(String),
    /// Metadata lookup failed.
    #[error("metadata lookup failed: {0}")]
    Metadata(#[from] MetadataError),
    /// Fetching or parsing the source document failed.
    #[error("document fetch failed: {0}")]
    Fetch(#[from] FetchError),
    /// Chunking parameters were rejected.
    #[error("failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// The embedding service did not return usable vectors.
    #[error("failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingError),
    /// The tenant collection could not be provisioned.
    #[error(transparent)]
    Collection(#[from] CollectionProvisionError),
    /// Writing points to the tenant collection failed.
    #[error(transparent)]
    Storage(#[from] StorageWriteError),
}

/// Summary of a completed ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingOutcome {
    /// Pages returned by the document store.
    pub pages: usize,
    /// Pages that contributed text.
    pub pages_with_text: usize,
    /// Number of chunks produced for the document.
    pub chunk_count: usize,
    /// Number of points written to the tenant collection.
    pub points_written: usize,
}
