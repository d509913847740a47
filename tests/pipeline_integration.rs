use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use docingest::{
    config::Config,
    documents::{DocumentRecord, HttpDocumentFetcher, MetadataError, MetadataStore},
    embedding::{EmbeddingClient, get_embedding_client},
    metrics::IngestMetrics,
    processing::{EmbeddingBatcher, IngestionPipeline, PipelineSettings},
    qdrant::QdrantService,
    queue::{
        Disposition, MessageAcker, MessageLifecycleController, MessageSource, QueueError,
        QueueMessage,
    },
};
use httpmock::prelude::*;
use serde_json::json;

const DIMENSION: usize = 8;

fn set_env(key: &str, value: &str) {
    // SAFETY: this test binary sets its environment once, before any worker threads read it.
    unsafe { std::env::set_var(key, value) }
}

struct StaticMetadata {
    records: HashMap<String, DocumentRecord>,
}

#[async_trait]
impl MetadataStore for StaticMetadata {
    async fn document(&self, document_id: &str) -> Result<Option<DocumentRecord>, MetadataError> {
        Ok(self.records.get(document_id).cloned())
    }
}

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

struct ScriptedSource {
    messages: VecDeque<QueueMessage>,
}

#[async_trait]
impl MessageSource for ScriptedSource {
    async fn next_message(&mut self) -> Option<Result<QueueMessage, QueueError>> {
        self.messages.pop_front().map(Ok)
    }
}

fn delivery(delivery_tag: u64, body: &str, settlements: &Settlements) -> QueueMessage {
    QueueMessage::new(
        body.as_bytes().to_vec(),
        false,
        delivery_tag,
        Box::new(RecordingAcker {
            delivery_tag,
            settlements: Arc::clone(settlements),
        }),
    )
}

fn record(storage_key: &str, file_name: &str, bot_id: &str) -> DocumentRecord {
    DocumentRecord {
        storage_key: storage_key.to_string(),
        file_name: file_name.to_string(),
        bot_id: bot_id.to_string(),
    }
}

#[tokio::test]
async fn worker_indexes_documents_and_settles_each_delivery() {
    let server = MockServer::start_async().await;

    let document_text = "abcdefghi ".repeat(240);
    let document = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/store/uploads/d1.txt")
                .header("authorization", "Bearer store-token");
            then.status(200).body(&document_text);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/store/uploads/missing.txt");
            then.status(404);
        })
        .await;

    let embeddings = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/embeddings")
                .header("authorization", "Bearer sk-test");
            then.status(200).json_body(json!({
                "data": [
                    { "index": 0, "embedding": vec![0.1; DIMENSION] },
                    { "index": 1, "embedding": vec![0.2; DIMENSION] },
                    { "index": 2, "embedding": vec![0.3; DIMENSION] }
                ]
            }));
        })
        .await;

    let lookup = server
        .mock_async(|when, then| {
            when.method(GET).path("/collections/b1");
            then.status(404)
                .json_body(json!({ "status": { "error": "Not found" } }));
        })
        .await;
    let create = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/collections/b1")
                .json_body(json!({ "vectors": { "size": DIMENSION, "distance": "Cosine" } }));
            then.status(200)
                .json_body(json!({ "result": true, "status": "ok" }));
        })
        .await;
    let upsert = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/collections/b1/points")
                .query_param("wait", "true")
                .body_contains("\"doc_id\":\"d1\"")
                .body_contains("\"bot_id\":\"b1\"")
                .body_contains("\"chunk_index\":2");
            then.status(200)
                .json_body(json!({ "result": { "status": "completed" }, "status": "ok" }));
        })
        .await;

    set_env("RABBIT_MQ_URL", "amqp://127.0.0.1:5672/%2f");
    set_env("DATABASE_URL", "postgres://unused@127.0.0.1/unused");
    set_env("DOCUMENT_STORE_URL", &server.url("/store"));
    set_env("DOCUMENT_STORE_TOKEN", "store-token");
    set_env("QDRANT_URL", &server.base_url());
    set_env("EMBEDDING_PROVIDER", "openai");
    set_env("OPENAI_API_KEY", "sk-test");
    set_env("OPENAI_BASE_URL", &server.url("/v1"));
    set_env("EMBEDDING_DIMENSION", &DIMENSION.to_string());
    set_env("EMBEDDING_MAX_BATCH_TOKENS", "0");
    set_env("EMBEDDING_MAX_RETRIES", "1");
    let config = Config::from_env().expect("config");
    assert_eq!(config.chunk_size, 1000);
    assert_eq!(config.chunk_overlap, 200);

    let metrics = Arc::new(IngestMetrics::new());
    let embedder: Arc<dyn EmbeddingClient> =
        Arc::from(get_embedding_client(&config).expect("embedding client"));
    let batcher = EmbeddingBatcher::new(
        embedder,
        config.embedding_max_batch,
        config.embedding_concurrency,
        config.embedding_dimension,
    );
    let metadata = StaticMetadata {
        records: HashMap::from([
            ("d1".to_string(), record("uploads/d1.txt", "d1.txt", "b1")),
            (
                "d2".to_string(),
                record("uploads/missing.txt", "missing.txt", "b1"),
            ),
        ]),
    };
    let fetcher = HttpDocumentFetcher::new(
        &config.document_store_url,
        config.document_store_token.clone(),
        Duration::from_secs(5),
    )
    .expect("fetcher");
    let qdrant = QdrantService::new(&config.qdrant_url, None).expect("qdrant client");

    let pipeline = IngestionPipeline::new(
        Arc::new(metadata),
        Arc::new(fetcher),
        batcher,
        Arc::new(qdrant),
        PipelineSettings::from_config(&config),
        Arc::clone(&metrics),
    );
    let controller = MessageLifecycleController::new(Arc::new(pipeline), Arc::clone(&metrics));

    let settlements = Settlements::default();
    let mut source = ScriptedSource {
        messages: VecDeque::from([
            delivery(
                1,
                r#"{"document_id":"d1","bot_id":"b1","user_id":"u1"}"#,
                &settlements,
            ),
            delivery(
                2,
                r#"{"document_id":"d2","bot_id":"b1","user_id":"u1"}"#,
                &settlements,
            ),
            delivery(3, "not a job", &settlements),
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

    document.assert_async().await;
    embeddings.assert_async().await;
    lookup.assert_async().await;
    create.assert_async().await;
    upsert.assert_async().await;

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.messages_received, 3);
    assert_eq!(snapshot.acknowledged, 1);
    assert_eq!(snapshot.rejected_permanent, 2);
    assert_eq!(snapshot.requeued, 0);
    assert_eq!(snapshot.documents_indexed, 1);
    assert_eq!(snapshot.chunks_indexed, 3);
}
