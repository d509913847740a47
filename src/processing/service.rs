//! Ingestion pipeline coordinating metadata lookup, fetching, chunking, embedding, and writes.

use crate::{
    config::Config,
    documents::{DocumentFetcher, FetchedDocument, MetadataStore},
    metrics::IngestMetrics,
    processing::{
        batcher::EmbeddingBatcher,
        chunking::chunk_pages,
        types::{JobDescriptor, PipelineError, ProcessingOutcome, RawPage},
    },
    qdrant::{CollectionManager, Distance, VectorStore, VectorUpserter, payload::build_points},
};
use async_trait::async_trait;
use std::sync::Arc;

/// Tunables applied to every job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters carried over between adjacent chunks.
    pub chunk_overlap: usize,
    /// Vector size of tenant collections.
    pub vector_size: u64,
    /// Distance metric of tenant collections.
    pub distance: Distance,
    /// Maximum points per upsert request.
    pub upsert_batch_size: usize,
}

impl PipelineSettings {
    /// Derive settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            vector_size: config.embedding_dimension as u64,
            distance: config.vector_distance,
            upsert_batch_size: config.upsert_batch_size,
        }
    }
}

/// Processes one ingestion job end to end.
#[async_trait]
pub trait DocumentProcessor: Send + Sync {
    /// Ingest the document named by `job` into its tenant's collection.
    async fn process(&self, job: &JobDescriptor) -> Result<ProcessingOutcome, PipelineError>;
}

/// Runs a job through every pipeline stage in order, aborting on the first failure.
///
/// The scratch copy of the fetched document is released on every exit path once the fetch has
/// succeeded.
pub struct IngestionPipeline {
    metadata: Arc<dyn MetadataStore>,
    fetcher: Arc<dyn DocumentFetcher>,
    batcher: EmbeddingBatcher,
    collections: CollectionManager,
    upserter: VectorUpserter,
    settings: PipelineSettings,
    metrics: Arc<IngestMetrics>,
}

impl IngestionPipeline {
    /// Assemble a pipeline from its collaborators.
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        fetcher: Arc<dyn DocumentFetcher>,
        batcher: EmbeddingBatcher,
        store: Arc<dyn VectorStore>,
        settings: PipelineSettings,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        Self {
            metadata,
            fetcher,
            batcher,
            collections: CollectionManager::new(Arc::clone(&store)),
            upserter: VectorUpserter::new(store),
            settings,
            metrics,
        }
    }

    async fn index_pages(
        &self,
        job: &JobDescriptor,
        file_name: &str,
        pages: &[RawPage],
    ) -> Result<ProcessingOutcome, PipelineError> {
        let pages_with_text = pages
            .iter()
            .filter(|page| !page.text.trim().is_empty())
            .count();
        if pages_with_text == 0 {
            return Err(PipelineError::Validation(format!(
                "document {} has no extractable text",
                job.document_id
            )));
        }

        let chunks = chunk_pages(
            pages,
            &job.document_id,
            self.settings.chunk_size,
            self.settings.chunk_overlap,
        )?;
        if chunks.is_empty() {
            return Err(PipelineError::Validation(format!(
                "document {} produced no chunks",
                job.document_id
            )));
        }
        let chunk_count = chunks.len();
        tracing::debug!(
            document_id = %job.document_id,
            pages = pages.len(),
            pages_with_text,
            chunks = chunk_count,
            "Chunked document"
        );

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.batcher.embed(&texts).await?;

        self.collections
            .ensure(&job.bot_id, self.settings.vector_size, self.settings.distance)
            .await?;

        let points = build_points(job, file_name, chunks, vectors);
        let points_written = self
            .upserter
            .upsert(&job.bot_id, &points, self.settings.upsert_batch_size)
            .await?;

        Ok(ProcessingOutcome {
            pages: pages.len(),
            pages_with_text,
            chunk_count,
            points_written,
        })
    }
}

#[async_trait]
impl DocumentProcessor for IngestionPipeline {
    async fn process(&self, job: &JobDescriptor) -> Result<ProcessingOutcome, PipelineError> {
        let record = self
            .metadata
            .document(&job.document_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("document {}", job.document_id)))?;

        if record.bot_id != job.bot_id {
            return Err(PipelineError::Validation(format!(
                "document {} belongs to tenant {}, not {}",
                job.document_id, record.bot_id, job.bot_id
            )));
        }

        let FetchedDocument { pages, scratch } = self
            .fetcher
            .fetch(&record.storage_key, &record.file_name)
            .await?;

        let result = self.index_pages(job, &record.file_name, &pages).await;

        if let Err(error) = scratch.release() {
            tracing::warn!(
                document_id = %job.document_id,
                error = %error,
                "Failed to remove scratch file"
            );
        }

        let outcome = result?;
        self.metrics.record_document(outcome.chunk_count as u64);
        tracing::info!(
            document_id = %job.document_id,
            bot_id = %job.bot_id,
            chunks = outcome.chunk_count,
            points = outcome.points_written,
            "Document indexed"
        );
        Ok(outcome)
    }
}
