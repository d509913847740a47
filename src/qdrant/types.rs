//! Shared types used by the Qdrant client and helpers.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors returned while interacting with Qdrant.
#[derive(Debug, Error)]
pub enum QdrantError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Qdrant responded with an unexpected status code.
    #[error("Unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Qdrant.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Distance metric configured on a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distance {
    /// Cosine similarity.
    Cosine,
    /// Dot product.
    Dot,
    /// Euclidean distance.
    Euclid,
    /// Manhattan distance.
    Manhattan,
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cosine => "Cosine",
            Self::Dot => "Dot",
            Self::Euclid => "Euclid",
            Self::Manhattan => "Manhattan",
        };
        f.write_str(name)
    }
}

impl FromStr for Distance {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dot" => Ok(Self::Dot),
            "euclid" | "euclidean" => Ok(Self::Euclid),
            "manhattan" => Ok(Self::Manhattan),
            _ => Err(()),
        }
    }
}

/// Vector parameters fixed when a collection is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionConfig {
    /// Dimensionality of every vector stored in the collection.
    pub vector_size: u64,
    /// Distance metric used for similarity queries.
    pub distance: Distance,
}

/// Result of a create request that tolerates concurrent creators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateCollectionOutcome {
    /// This call created the collection.
    Created,
    /// Another writer created the collection first.
    AlreadyExists,
}

/// Lightweight collection description used by operator tooling.
#[derive(Debug, Clone)]
pub struct CollectionInfo {
    /// Collection status reported by Qdrant (`green`, `yellow`, ...).
    pub status: String,
    /// Number of points stored in the collection, when reported.
    pub points_count: Option<u64>,
    /// Vector parameters, when the collection uses a single unnamed vector.
    pub config: Option<CollectionConfig>,
}

/// Metadata stored alongside each vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointPayload {
    /// Tenant that owns the document.
    pub bot_id: String,
    /// Source document identifier.
    pub doc_id: String,
    /// Original file name of the document.
    pub file_name: String,
    /// User that uploaded the document.
    pub user_id: String,
    /// 1-indexed page the chunk came from.
    pub page_number: u32,
    /// Position of the chunk within the document.
    pub chunk_index: usize,
    /// Chunk text.
    pub text: String,
    /// SHA-256 of the chunk text.
    pub chunk_hash: String,
    /// RFC 3339 timestamp of the write.
    pub ingested_at: String,
}

/// Point written to a tenant collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorPoint {
    /// Identifier derived from `(doc_id, chunk_index)`.
    pub id: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// Filterable metadata.
    pub payload: PointPayload,
}

#[derive(Deserialize)]
pub(crate) struct CollectionInfoResponse {
    pub(crate) result: CollectionInfoResult,
}

#[derive(Deserialize)]
pub(crate) struct CollectionInfoResult {
    #[serde(default)]
    pub(crate) status: Option<String>,
    #[serde(default)]
    pub(crate) points_count: Option<u64>,
    #[serde(default)]
    pub(crate) config: Option<CollectionConfigBody>,
}

#[derive(Deserialize)]
pub(crate) struct CollectionConfigBody {
    pub(crate) params: CollectionParams,
}

#[derive(Deserialize)]
pub(crate) struct CollectionParams {
    #[serde(default)]
    pub(crate) vectors: Option<Value>,
}

#[derive(Deserialize)]
pub(crate) struct CountResponse {
    pub(crate) result: CountResult,
}

#[derive(Deserialize)]
pub(crate) struct CountResult {
    pub(crate) count: u64,
}

impl CollectionInfoResult {
    /// Extract `{size, distance}` for collections with a single unnamed vector.
    pub(crate) fn vector_config(&self) -> Option<CollectionConfig> {
        let vectors = self.config.as_ref()?.params.vectors.as_ref()?;
        let size = vectors.get("size")?.as_u64()?;
        let distance = vectors.get("distance")?.as_str()?.parse().ok()?;
        Some(CollectionConfig {
            vector_size: size,
            distance,
        })
    }
}
