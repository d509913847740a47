use anyhow::{Context, Result};
use docingest::{
    api, config,
    documents::{HttpDocumentFetcher, PgMetadataStore},
    embedding::{EmbeddingClient, get_embedding_client},
    logging,
    metrics::IngestMetrics,
    processing::{EmbeddingBatcher, IngestionPipeline, PipelineSettings, cl100k_token_counter},
    qdrant::QdrantService,
    queue::{AmqpQueue, MessageLifecycleController},
};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

const METADATA_POOL_SIZE: u32 = 2;
const FETCH_TIMEOUT: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        tracing::error!(error = %format!("{err:#}"), "Worker stopped with an error");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = config::init_config().context("failed to load configuration")?;
    logging::init_tracing();
    tracing::info!(
        queue = %config.queue_name,
        qdrant_url = %config.qdrant_url,
        embedding_dimension = config.embedding_dimension,
        distance = %config.vector_distance,
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        "Loaded configuration"
    );

    let metrics = Arc::new(IngestMetrics::new());

    let qdrant = Arc::new(
        QdrantService::new(&config.qdrant_url, config.qdrant_api_key.clone())
            .context("failed to configure Qdrant client")?,
    );

    tracing::info!(
        provider = ?config.embedding_provider,
        model = %config.embedding_model,
        "Initializing embedding client"
    );
    let embedder: Arc<dyn EmbeddingClient> = Arc::from(
        get_embedding_client(config).context("failed to configure embedding client")?,
    );
    let mut batcher = EmbeddingBatcher::new(
        embedder,
        config.embedding_max_batch,
        config.embedding_concurrency,
        config.embedding_dimension,
    );
    if let Some(max_tokens) = config.embedding_max_batch_tokens {
        batcher = batcher.with_token_budget(max_tokens, cl100k_token_counter()?);
    }

    let metadata = Arc::new(
        PgMetadataStore::connect(&config.database_url, METADATA_POOL_SIZE)
            .await
            .context("failed to connect to the metadata store")?,
    );
    let fetcher = Arc::new(
        HttpDocumentFetcher::new(
            &config.document_store_url,
            config.document_store_token.clone(),
            FETCH_TIMEOUT,
        )
        .context("failed to configure document fetcher")?,
    );

    let pipeline = IngestionPipeline::new(
        metadata.clone(),
        fetcher,
        batcher,
        qdrant,
        PipelineSettings::from_config(config),
        metrics.clone(),
    );
    let controller = MessageLifecycleController::new(Arc::new(pipeline), metrics.clone());

    if let Some(port) = config.health_port {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .with_context(|| format!("failed to bind probe server on port {port}"))?;
        let app = api::create_router(metrics.clone());
        tracing::info!("Probe server listening on http://0.0.0.0:{}", port);
        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                tracing::error!(error = %err, "Probe server stopped");
            }
        });
    }

    let queue = AmqpQueue::connect(&config.amqp_url, &config.queue_name)
        .await
        .context("failed to connect to the broker")?;
    let consumer_tag = format!("docingest-{}", uuid::Uuid::new_v4());
    let mut consumer = queue
        .consumer(&consumer_tag)
        .await
        .context("failed to start consuming")?;
    tracing::info!(queue = queue.queue_name(), consumer_tag, "Waiting for jobs");

    let outcome = controller.run(&mut consumer, shutdown_signal()).await;

    drop(consumer);
    if let Err(err) = queue.close().await {
        tracing::warn!(error = %err, "Failed to close broker connection cleanly");
    }
    metadata.close().await;
    tracing::info!(metrics = ?metrics.snapshot(), "Worker stopped");

    outcome.context("message consumption failed")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
