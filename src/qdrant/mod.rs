//! Qdrant vector store integration.

pub mod client;
pub mod collections;
pub mod filters;
pub mod payload;
pub mod store;
pub mod types;
pub mod upsert;

pub use client::QdrantService;
pub use collections::{CollectionManager, CollectionProvisionError};
pub use filters::document_filter;
pub use payload::{compute_chunk_hash, point_id};
pub use store::VectorStore;
pub use types::{
    CollectionConfig, CollectionInfo, CreateCollectionOutcome, Distance, PointPayload,
    QdrantError, VectorPoint,
};
pub use upsert::{StorageWriteError, VectorUpserter};
