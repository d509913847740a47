//! Helpers for constructing point identifiers and payloads.

use crate::processing::types::{Chunk, JobDescriptor};
use crate::qdrant::types::{PointPayload, VectorPoint};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

/// Namespace for point identifiers; changing it re-keys every stored point.
const POINT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f3c_2a1e_9b4d_4c57_8e21_d0a5_b7c3_1f42);

/// Derive the point identifier for a chunk of a document.
///
/// The identifier only depends on `(doc_id, chunk_index)`, so a redelivered job overwrites
/// the points written by an earlier attempt instead of duplicating them.
pub fn point_id(doc_id: &str, chunk_index: usize) -> String {
    let name = format!("{doc_id}:{chunk_index}");
    Uuid::new_v5(&POINT_ID_NAMESPACE, name.as_bytes()).to_string()
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Pair chunks with their vectors, producing points in chunk order.
///
/// Callers must pass vectors positionally aligned with `chunks`.
pub(crate) fn build_points(
    job: &JobDescriptor,
    file_name: &str,
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
) -> Vec<VectorPoint> {
    debug_assert_eq!(chunks.len(), vectors.len());
    let now = current_timestamp_rfc3339();
    chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| VectorPoint {
            id: point_id(&chunk.source_document_id, chunk.chunk_index),
            vector,
            payload: PointPayload {
                bot_id: job.bot_id.clone(),
                doc_id: chunk.source_document_id,
                file_name: file_name.to_string(),
                user_id: job.user_id.clone(),
                page_number: chunk.page_number,
                chunk_index: chunk.chunk_index,
                chunk_hash: compute_chunk_hash(&chunk.text),
                text: chunk.text,
                ingested_at: now.clone(),
            },
        })
        .collect()
}
