//! Batched point writes against a tenant collection.

use crate::qdrant::store::VectorStore;
use crate::qdrant::types::{QdrantError, VectorPoint};
use std::sync::Arc;
use thiserror::Error;

/// A batch write failed; earlier batches stay persisted.
#[derive(Debug, Error)]
#[error(
    "upsert batch {batch} of {total_batches} into '{collection}' failed after {written} points were written: {source}"
)]
pub struct StorageWriteError {
    /// Collection targeted by the write.
    pub collection: String,
    /// 1-based index of the failing batch.
    pub batch: usize,
    /// Total number of batches planned for the write.
    pub total_batches: usize,
    /// Points persisted by the batches that succeeded before the failure.
    pub written: usize,
    /// Underlying store error.
    #[source]
    pub source: QdrantError,
}

/// Writes points in sequential, size-bounded batches.
pub struct VectorUpserter {
    store: Arc<dyn VectorStore>,
}

impl VectorUpserter {
    /// Build an upserter backed by the given vector store.
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    /// Upsert `points` into the tenant collection in batches of at most `batch_size`.
    ///
    /// Batches are issued in order; the first failure stops the write and is returned with the
    /// number of points already persisted.
    pub async fn upsert(
        &self,
        tenant_id: &str,
        points: &[VectorPoint],
        batch_size: usize,
    ) -> Result<usize, StorageWriteError> {
        let batch_size = batch_size.max(1);
        let total_batches = points.len().div_ceil(batch_size);
        let mut written = 0;

        for (index, batch) in points.chunks(batch_size).enumerate() {
            tracing::debug!(
                collection = tenant_id,
                batch = index + 1,
                total_batches,
                points = batch.len(),
                "Upserting batch"
            );
            match self.store.upsert_points(tenant_id, batch).await {
                Ok(count) => written += count,
                Err(source) => {
                    return Err(StorageWriteError {
                        collection: tenant_id.to_string(),
                        batch: index + 1,
                        total_batches,
                        written,
                        source,
                    });
                }
            }
        }

        tracing::debug!(collection = tenant_id, points = written, "Upsert complete");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qdrant::collections::tests::MemoryStore;
    use crate::qdrant::payload::point_id;
    use crate::qdrant::types::PointPayload;
    use std::sync::atomic::Ordering;

    fn points(count: usize) -> Vec<VectorPoint> {
        (0..count)
            .map(|index| VectorPoint {
                id: point_id("d1", index),
                vector: vec![index as f32],
                payload: PointPayload {
                    bot_id: "b1".into(),
                    doc_id: "d1".into(),
                    file_name: "doc.txt".into(),
                    user_id: "u1".into(),
                    page_number: 1,
                    chunk_index: index,
                    text: format!("chunk {index}"),
                    chunk_hash: String::new(),
                    ingested_at: String::new(),
                },
            })
            .collect()
    }

    #[tokio::test]
    async fn upsert_splits_into_bounded_batches() {
        let store = Arc::new(MemoryStore::default());
        let upserter = VectorUpserter::new(store.clone());

        let written = upserter
            .upsert("b1", &points(250), 100)
            .await
            .expect("upsert");

        assert_eq!(written, 250);
        assert_eq!(store.upsert_calls.load(Ordering::SeqCst), 3);
        let stored = store.stored("b1");
        assert_eq!(stored.len(), 250);
        assert_eq!(stored[0].payload.chunk_index, 0);
        assert_eq!(stored[249].payload.chunk_index, 249);
    }

    #[tokio::test]
    async fn failed_batch_keeps_earlier_writes() {
        let store = Arc::new(MemoryStore {
            fail_upsert_on_call: Some(1),
            ..Default::default()
        });
        let upserter = VectorUpserter::new(store.clone());

        let error = upserter
            .upsert("b1", &points(250), 100)
            .await
            .unwrap_err();

        assert_eq!(error.batch, 2);
        assert_eq!(error.total_batches, 3);
        assert_eq!(error.written, 100);
        assert_eq!(store.stored("b1").len(), 100);
    }

    #[tokio::test]
    async fn rewriting_same_points_overwrites() {
        let store = Arc::new(MemoryStore::default());
        let upserter = VectorUpserter::new(store.clone());

        upserter.upsert("b1", &points(5), 2).await.expect("first");
        upserter.upsert("b1", &points(5), 2).await.expect("retry");

        assert_eq!(store.stored("b1").len(), 5);
    }

    #[tokio::test]
    async fn empty_input_writes_nothing() {
        let store = Arc::new(MemoryStore::default());
        let upserter = VectorUpserter::new(store.clone());

        let written = upserter.upsert("b1", &[], 100).await.expect("noop");
        assert_eq!(written, 0);
        assert_eq!(store.upsert_calls.load(Ordering::SeqCst), 0);
    }
}
