//! Per-message state machine: `Received -> Processing -> {Acknowledged | Rejected | Requeued}`.
//!
//! [`classify`] is the only place where pipeline failures are mapped to the failure taxonomy,
//! and [`FailureKind::disposition`] the only place where the taxonomy is mapped to broker
//! actions. Permanent failures are rejected without requeue; everything else, including errors
//! with no recognised signature, goes back to the queue.

use super::types::{Disposition, MessageSource, QueueError, QueueMessage};
use crate::{
    documents::{FetchError, MetadataError},
    embedding::{EmbeddingClientError, EmbeddingError},
    metrics::IngestMetrics,
    processing::{DocumentProcessor, JobDescriptor, PipelineError},
    qdrant::{CollectionProvisionError, QdrantError},
};
use reqwest::StatusCode;
use std::future::Future;
use std::sync::Arc;

/// Failure taxonomy used to decide whether a job is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Document or tenant metadata is missing.
    NotFound,
    /// The document can never be ingested as-is.
    Validation,
    /// The source file is malformed.
    CorruptInput,
    /// A collaborator timed out, throttled, or answered with a server error.
    TransientIO,
    /// No known signature matched.
    Unclassified,
}

impl FailureKind {
    /// Whether retrying the job can never succeed without outside intervention.
    pub fn is_permanent(self) -> bool {
        matches!(self, Self::NotFound | Self::Validation | Self::CorruptInput)
    }

    /// Broker action for a job that failed with this kind of error.
    pub fn disposition(self) -> Disposition {
        if self.is_permanent() {
            Disposition::RejectNoRequeue
        } else {
            Disposition::RejectRequeue
        }
    }
}

/// Map a pipeline failure to its [`FailureKind`].
pub fn classify(error: &PipelineError) -> FailureKind {
    match error {
        PipelineError::NotFound(_) => FailureKind::NotFound,
        PipelineError::Validation(_) | PipelineError::Chunking(_) => FailureKind::Validation,
        PipelineError::Metadata(MetadataError::Unavailable(_)) => FailureKind::TransientIO,
        PipelineError::Metadata(MetadataError::Query(_)) => FailureKind::Unclassified,
        PipelineError::Fetch(error) => match error {
            FetchError::NotFound(_) => FailureKind::NotFound,
            FetchError::CorruptInput(_) => FailureKind::CorruptInput,
            FetchError::Transport(_) => FailureKind::TransientIO,
            FetchError::UnexpectedStatus { status, .. } => status_kind(*status),
            FetchError::Io(_) => FailureKind::Unclassified,
        },
        PipelineError::Embedding(EmbeddingError::Client(error)) => match error {
            EmbeddingClientError::Timeout
            | EmbeddingClientError::RateLimited
            | EmbeddingClientError::Transport(_) => FailureKind::TransientIO,
            EmbeddingClientError::UnexpectedStatus { status, .. } => status_kind(*status),
            EmbeddingClientError::InvalidResponse(_)
            | EmbeddingClientError::GenerationFailed(_) => FailureKind::Unclassified,
        },
        PipelineError::Embedding(
            EmbeddingError::CountMismatch { .. } | EmbeddingError::DimensionMismatch { .. },
        ) => FailureKind::Unclassified,
        PipelineError::Collection(CollectionProvisionError::ConfigMismatch { .. }) => {
            FailureKind::Validation
        }
        PipelineError::Collection(CollectionProvisionError::Store { source, .. }) => {
            store_kind(source)
        }
        PipelineError::Storage(error) => store_kind(&error.source),
    }
}

fn status_kind(status: StatusCode) -> FailureKind {
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        FailureKind::TransientIO
    } else {
        FailureKind::Unclassified
    }
}

fn store_kind(error: &QdrantError) -> FailureKind {
    match error {
        QdrantError::Http(_) => FailureKind::TransientIO,
        QdrantError::UnexpectedStatus { status, .. } => status_kind(*status),
        QdrantError::InvalidUrl(_) => FailureKind::Unclassified,
    }
}

/// Drives deliveries through the pipeline and settles each one exactly once.
pub struct MessageLifecycleController {
    processor: Arc<dyn DocumentProcessor>,
    metrics: Arc<IngestMetrics>,
}

impl MessageLifecycleController {
    /// Build a controller around a document processor.
    pub fn new(processor: Arc<dyn DocumentProcessor>, metrics: Arc<IngestMetrics>) -> Self {
        Self { processor, metrics }
    }

    /// Decide the disposition for a raw message body by running the job it describes.
    pub async fn dispatch(&self, body: &[u8], redelivered: bool) -> Disposition {
        let job: JobDescriptor = match serde_json::from_slice(body) {
            Ok(job) => job,
            Err(error) => {
                tracing::error!(error = %error, "Malformed job payload; rejecting");
                return Disposition::RejectNoRequeue;
            }
        };
        if job.document_id.is_empty() || job.bot_id.is_empty() || job.user_id.is_empty() {
            tracing::error!(?job, "Job is missing identifiers; rejecting");
            return Disposition::RejectNoRequeue;
        }

        tracing::info!(
            document_id = %job.document_id,
            bot_id = %job.bot_id,
            redelivered,
            "Processing job"
        );

        match self.processor.process(&job).await {
            Ok(_) => Disposition::Acknowledge,
            Err(error) => {
                let kind = classify(&error);
                let disposition = kind.disposition();
                if kind.is_permanent() {
                    tracing::error!(
                        document_id = %job.document_id,
                        bot_id = %job.bot_id,
                        kind = ?kind,
                        disposition = %disposition,
                        error = %error,
                        "Job failed permanently"
                    );
                } else {
                    tracing::warn!(
                        document_id = %job.document_id,
                        bot_id = %job.bot_id,
                        kind = ?kind,
                        disposition = %disposition,
                        error = %error,
                        "Job failed; returning to queue"
                    );
                }
                disposition
            }
        }
    }

    /// Process one delivery and settle it with the broker.
    pub async fn handle(&self, message: QueueMessage) -> Result<Disposition, QueueError> {
        self.metrics.record_received();
        let delivery_tag = message.delivery_tag;
        let disposition = self.dispatch(&message.body, message.redelivered).await;
        message.settle(disposition).await?;

        match disposition {
            Disposition::Acknowledge => self.metrics.record_acknowledged(),
            Disposition::RejectNoRequeue => self.metrics.record_rejected(),
            Disposition::RejectRequeue => self.metrics.record_requeued(),
        }
        tracing::debug!(delivery_tag, disposition = %disposition, "Delivery settled");
        Ok(disposition)
    }

    /// Consume deliveries one at a time until the source ends or `shutdown` resolves.
    ///
    /// Shutdown is only observed between messages: a job that has started always runs to a
    /// terminal disposition and is settled before the loop exits.
    pub async fn run<S, F>(&self, source: &mut S, shutdown: F) -> Result<(), QueueError>
    where
        S: MessageSource + ?Sized,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let next = tokio::select! {
                biased;
                () = &mut shutdown => {
                    tracing::info!("Shutdown requested; no further messages will be consumed");
                    break;
                }
                next = source.next_message() => next,
            };

            let Some(next) = next else {
                tracing::info!("Consumer stream ended");
                break;
            };
            self.handle(next?).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::fakes::{FakeEmbedder, FakeFetcher, FakeMetadata, pipeline};
    use crate::processing::{ChunkingError, ProcessingOutcome};
    use crate::qdrant::collections::tests::MemoryStore;
    use crate::qdrant::{CollectionConfig, Distance, StorageWriteError};
    use crate::queue::types::MessageAcker;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    type Settlements = Arc<Mutex<Vec<(u64, Disposition)>>>;

    struct RecordingAcker {
        delivery_tag: u64,
        settlements: Settlements,
    }

    #[async_trait]
    impl MessageAcker for RecordingAcker {
        async fn ack(&self) -> Result<(), QueueError> {
            self.settlements
                .lock()
                .unwrap()
                .push((self.delivery_tag, Disposition::Acknowledge));
            Ok(())
        }

        async fn reject(&self, requeue: bool) -> Result<(), QueueError> {
            let disposition = if requeue {
                Disposition::RejectRequeue
            } else {
                Disposition::RejectNoRequeue
            };
            self.settlements
                .lock()
                .unwrap()
                .push((self.delivery_tag, disposition));
            Ok(())
        }
    }

    struct VecSource {
        messages: VecDeque<QueueMessage>,
    }

    #[async_trait]
    impl MessageSource for VecSource {
        async fn next_message(&mut self) -> Option<Result<QueueMessage, QueueError>> {
            self.messages.pop_front().map(Ok)
        }
    }

    fn message(
        delivery_tag: u64,
        body: &[u8],
        redelivered: bool,
        settlements: &Settlements,
    ) -> QueueMessage {
        QueueMessage::new(
            body.to_vec(),
            redelivered,
            delivery_tag,
            Box::new(RecordingAcker {
                delivery_tag,
                settlements: Arc::clone(settlements),
            }),
        )
    }

    fn job_body() -> Vec<u8> {
        br#"{"document_id":"d1","bot_id":"b1","user_id":"u1"}"#.to_vec()
    }

    /// Replays scripted results and optionally signals when a job starts.
    #[derive(Default)]
    struct ScriptedProcessor {
        results: Mutex<VecDeque<Result<ProcessingOutcome, PipelineError>>>,
        calls: AtomicUsize,
        started: Mutex<Option<oneshot::Sender<()>>>,
    }

    fn outcome() -> ProcessingOutcome {
        ProcessingOutcome {
            pages: 1,
            pages_with_text: 1,
            chunk_count: 1,
            points_written: 1,
        }
    }

    #[async_trait]
    impl DocumentProcessor for ScriptedProcessor {
        async fn process(
            &self,
            _job: &JobDescriptor,
        ) -> Result<ProcessingOutcome, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let started = self.started.lock().unwrap().take();
            if let Some(started) = started {
                let _ = started.send(());
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(outcome()))
        }
    }

    fn controller(
        processor: Arc<dyn DocumentProcessor>,
    ) -> (MessageLifecycleController, Arc<IngestMetrics>) {
        let metrics = Arc::new(IngestMetrics::new());
        (
            MessageLifecycleController::new(processor, Arc::clone(&metrics)),
            metrics,
        )
    }

    fn storage_error(status: StatusCode) -> PipelineError {
        PipelineError::Storage(StorageWriteError {
            collection: "b1".into(),
            batch: 1,
            total_batches: 1,
            written: 0,
            source: QdrantError::UnexpectedStatus {
                status,
                body: String::new(),
            },
        })
    }

    #[test]
    fn permanent_failures_are_not_requeued() {
        let cosine = |vector_size| CollectionConfig {
            vector_size,
            distance: Distance::Cosine,
        };
        let permanent = vec![
            PipelineError::NotFound("document d1".into()),
            PipelineError::Validation("no extractable text".into()),
            PipelineError::Fetch(FetchError::NotFound("uploads/d1.pdf".into())),
            PipelineError::Fetch(FetchError::CorruptInput("bad header".into())),
            PipelineError::Chunking(ChunkingError::InvalidChunkSize),
            PipelineError::Collection(CollectionProvisionError::ConfigMismatch {
                collection: "b1".into(),
                existing: cosine(768),
                requested: cosine(1536),
            }),
        ];
        for error in &permanent {
            assert_eq!(
                classify(error).disposition(),
                Disposition::RejectNoRequeue,
                "{error}"
            );
        }
    }

    #[test]
    fn transient_and_unknown_failures_are_requeued() {
        let transient = vec![
            PipelineError::Metadata(MetadataError::Unavailable(sqlx::Error::PoolTimedOut)),
            PipelineError::Embedding(EmbeddingError::Client(EmbeddingClientError::Timeout)),
            PipelineError::Embedding(EmbeddingError::Client(EmbeddingClientError::RateLimited)),
            PipelineError::Fetch(FetchError::UnexpectedStatus {
                status: StatusCode::BAD_GATEWAY,
                body: String::new(),
            }),
            storage_error(StatusCode::SERVICE_UNAVAILABLE),
        ];
        for error in &transient {
            assert_eq!(classify(error), FailureKind::TransientIO, "{error}");
            assert_eq!(classify(error).disposition(), Disposition::RejectRequeue);
        }

        let unclassified = vec![
            PipelineError::Embedding(EmbeddingError::DimensionMismatch {
                expected: 1536,
                actual: 768,
            }),
            PipelineError::Embedding(EmbeddingError::CountMismatch {
                expected: 3,
                actual: 2,
            }),
            PipelineError::Embedding(EmbeddingError::Client(
                EmbeddingClientError::InvalidResponse("eof".into()),
            )),
            storage_error(StatusCode::BAD_REQUEST),
        ];
        for error in &unclassified {
            assert_eq!(classify(error), FailureKind::Unclassified, "{error}");
            assert_eq!(classify(error).disposition(), Disposition::RejectRequeue);
        }
    }

    #[test]
    fn classification_is_deterministic() {
        let error = PipelineError::Fetch(FetchError::CorruptInput("premature EOF".into()));
        let first = classify(&error);
        for _ in 0..10 {
            assert_eq!(classify(&error), first);
        }
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected_without_processing() {
        let processor = Arc::new(ScriptedProcessor::default());
        let (controller, metrics) = controller(processor.clone());
        let settlements = Settlements::default();

        let disposition = controller
            .handle(message(1, b"{not json", false, &settlements))
            .await
            .expect("settle");
        assert_eq!(disposition, Disposition::RejectNoRequeue);

        let missing_id = br#"{"document_id":"","bot_id":"b1","user_id":"u1"}"#;
        controller
            .handle(message(2, missing_id, false, &settlements))
            .await
            .expect("settle");

        assert_eq!(processor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            *settlements.lock().unwrap(),
            vec![
                (1, Disposition::RejectNoRequeue),
                (2, Disposition::RejectNoRequeue)
            ]
        );
        assert_eq!(metrics.snapshot().rejected_permanent, 2);
    }

    #[tokio::test]
    async fn missing_source_object_is_rejected_without_requeue() {
        let fetcher = Arc::new(FakeFetcher {
            missing: true,
            ..Default::default()
        });
        let pipeline = pipeline(
            FakeMetadata::with_document("d1", "b1", "d1.pdf"),
            fetcher,
            Arc::new(FakeEmbedder::default()),
            Arc::new(MemoryStore::default()),
        );
        let (controller, _) = controller(Arc::new(pipeline));
        let settlements = Settlements::default();

        let disposition = controller
            .handle(message(1, &job_body(), false, &settlements))
            .await
            .expect("settle");

        assert_eq!(disposition, Disposition::RejectNoRequeue);
    }

    #[tokio::test]
    async fn embedding_timeout_is_requeued_and_redelivery_succeeds() {
        let store = Arc::new(MemoryStore::default());
        let fetcher = Arc::new(FakeFetcher::with_pages(&["A short document."]));
        let pipeline = pipeline(
            FakeMetadata::with_document("d1", "b1", "d1.txt"),
            fetcher.clone(),
            Arc::new(FakeEmbedder {
                failures: 1,
                ..Default::default()
            }),
            store.clone(),
        );
        let (controller, metrics) = controller(Arc::new(pipeline));
        let settlements = Settlements::default();

        let first = controller
            .handle(message(1, &job_body(), false, &settlements))
            .await
            .expect("settle");
        assert_eq!(first, Disposition::RejectRequeue);
        assert!(store.stored("b1").is_empty());

        let second = controller
            .handle(message(2, &job_body(), true, &settlements))
            .await
            .expect("settle");
        assert_eq!(second, Disposition::Acknowledge);
        assert_eq!(store.stored("b1").len(), 1);
        assert!(fetcher.all_released());

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.messages_received, 2);
        assert_eq!(snapshot.requeued, 1);
        assert_eq!(snapshot.acknowledged, 1);
    }

    #[tokio::test]
    async fn run_settles_every_message_until_source_ends() {
        let processor = Arc::new(ScriptedProcessor::default());
        processor
            .results
            .lock()
            .unwrap()
            .extend([Ok(outcome()), Err(PipelineError::NotFound("d2".into()))]);
        let (controller, _) = controller(processor.clone());
        let settlements = Settlements::default();
        let mut source = VecSource {
            messages: VecDeque::from([
                message(1, &job_body(), false, &settlements),
                message(2, &job_body(), false, &settlements),
                message(3, b"garbage", false, &settlements),
            ]),
        };

        controller
            .run(&mut source, std::future::pending())
            .await
            .expect("run");

        assert_eq!(
            *settlements.lock().unwrap(),
            vec![
                (1, Disposition::Acknowledge),
                (2, Disposition::RejectNoRequeue),
                (3, Disposition::RejectNoRequeue),
            ]
        );
    }

    #[tokio::test]
    async fn shutdown_lets_in_flight_job_finish_then_stops() {
        let (started_tx, started_rx) = oneshot::channel();
        let processor = Arc::new(ScriptedProcessor {
            started: Mutex::new(Some(started_tx)),
            ..Default::default()
        });
        let (controller, _) = controller(processor.clone());
        let settlements = Settlements::default();
        let mut source = VecSource {
            messages: VecDeque::from([
                message(1, &job_body(), false, &settlements),
                message(2, &job_body(), false, &settlements),
            ]),
        };

        let shutdown = async {
            let _ = started_rx.await;
        };
        controller.run(&mut source, shutdown).await.expect("run");

        assert_eq!(
            *settlements.lock().unwrap(),
            vec![(1, Disposition::Acknowledge)]
        );
        assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.messages.len(), 1);
    }

    #[tokio::test]
    async fn shutdown_before_first_delivery_consumes_nothing() {
        let processor = Arc::new(ScriptedProcessor::default());
        let (controller, _) = controller(processor.clone());
        let settlements = Settlements::default();
        let mut source = VecSource {
            messages: VecDeque::from([message(1, &job_body(), false, &settlements)]),
        };

        controller
            .run(&mut source, std::future::ready(()))
            .await
            .expect("run");

        assert!(settlements.lock().unwrap().is_empty());
        assert_eq!(source.messages.len(), 1);
    }
}
