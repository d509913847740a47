//! Document metadata lookups.

use async_trait::async_trait;
use sqlx::FromRow;
use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;

const DOCUMENT_QUERY: &str = r#"SELECT "storageUrl" AS storage_key, "fileName" AS file_name, "botId" AS bot_id FROM "Document" WHERE id = $1"#;

/// Errors raised by the metadata store.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The store could not be reached.
    #[error("metadata store unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),
    /// The store was reached but the lookup failed.
    #[error("metadata query failed: {0}")]
    Query(#[source] sqlx::Error),
}

impl From<sqlx::Error> for MetadataError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::Unavailable(error),
            other => Self::Query(other),
        }
    }
}

/// Metadata describing where a document lives and who owns it.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct DocumentRecord {
    /// Object-store key of the uploaded file.
    pub storage_key: String,
    /// Original file name.
    pub file_name: String,
    /// Tenant that owns the document.
    pub bot_id: String,
}

/// Lookup of document records by id.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Return the record for `document_id`, or `None` when it does not exist.
    async fn document(&self, document_id: &str) -> Result<Option<DocumentRecord>, MetadataError>;
}

/// Postgres-backed metadata store.
#[derive(Clone)]
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    /// Connect a small pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, MetadataError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn document(&self, document_id: &str) -> Result<Option<DocumentRecord>, MetadataError> {
        let record = sqlx::query_as::<_, DocumentRecord>(DOCUMENT_QUERY)
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }
}
