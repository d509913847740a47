//! Storage seam used by the collection manager and the upserter.

use crate::qdrant::types::{
    CollectionConfig, CollectionInfo, CreateCollectionOutcome, QdrantError, VectorPoint,
};
use async_trait::async_trait;

/// Vector store operations required by the ingestion pipeline.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Describe a collection, or return `None` when it does not exist.
    async fn collection_info(
        &self,
        collection_name: &str,
    ) -> Result<Option<CollectionInfo>, QdrantError>;

    /// Create a collection; a concurrent creator winning the race is not an error.
    async fn create_collection(
        &self,
        collection_name: &str,
        config: CollectionConfig,
    ) -> Result<CreateCollectionOutcome, QdrantError>;

    /// Write (insert or overwrite) the given points, returning how many were written.
    async fn upsert_points(
        &self,
        collection_name: &str,
        points: &[VectorPoint],
    ) -> Result<usize, QdrantError>;
}
