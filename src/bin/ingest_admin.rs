use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use docingest::{
    processing::JobDescriptor,
    qdrant::{QdrantService, document_filter},
    queue::AmqpQueue,
};
use serde_json::json;

#[derive(Parser)]
#[command(
    name = "ingest-admin",
    about = "Operator commands for the document ingestion worker"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Queue a document for ingestion.
    Publish {
        #[command(flatten)]
        broker: BrokerArgs,
        #[arg(long)]
        document_id: String,
        #[arg(long)]
        bot_id: String,
        #[arg(long)]
        user_id: String,
    },
    /// Show a tenant collection's status and point count.
    Stats {
        #[command(flatten)]
        qdrant: QdrantArgs,
        #[arg(long)]
        bot_id: String,
        /// Count only the points of this document.
        #[arg(long)]
        document_id: Option<String>,
    },
    /// Drop a tenant's collection and every point in it.
    DeleteTenant {
        #[command(flatten)]
        qdrant: QdrantArgs,
        #[arg(long)]
        bot_id: String,
        /// Required to confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
    /// Remove one document's points from a tenant collection.
    DeleteDocument {
        #[command(flatten)]
        qdrant: QdrantArgs,
        #[arg(long)]
        bot_id: String,
        #[arg(long)]
        document_id: String,
    },
}

#[derive(Args)]
struct BrokerArgs {
    #[arg(long, env = "RABBIT_MQ_URL")]
    amqp_url: String,
    #[arg(long, env = "QUEUE_NAME", default_value = "document_process_queue")]
    queue: String,
}

#[derive(Args)]
struct QdrantArgs {
    #[arg(long, env = "QDRANT_URL")]
    qdrant_url: String,
    #[arg(long, env = "QDRANT_API_KEY")]
    qdrant_api_key: Option<String>,
}

impl QdrantArgs {
    fn connect(&self) -> Result<QdrantService> {
        QdrantService::new(&self.qdrant_url, self.qdrant_api_key.clone())
            .context("failed to configure Qdrant client")
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    if let Err(err) = run(Cli::parse()).await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Publish {
            broker,
            document_id,
            bot_id,
            user_id,
        } => {
            let job = JobDescriptor {
                document_id,
                bot_id,
                user_id,
            };
            let queue = AmqpQueue::connect(&broker.amqp_url, &broker.queue)
                .await
                .context("failed to connect to the broker")?;
            queue.publish(&job).await.context("failed to publish job")?;
            queue.close().await?;
            println!("queued {} on {}", job.document_id, broker.queue);
        }
        Command::Stats {
            qdrant,
            bot_id,
            document_id,
        } => {
            let service = qdrant.connect()?;
            let Some(info) = service.get_collection(&bot_id).await? else {
                bail!("collection '{bot_id}' does not exist");
            };
            let filter = document_id.as_deref().map(document_filter);
            let points = service.count_points(&bot_id, filter).await?;
            let report = json!({
                "collection": bot_id,
                "status": info.status,
                "vector_size": info.config.map(|config| config.vector_size),
                "distance": info.config.map(|config| config.distance.to_string()),
                "document_id": document_id,
                "points": points,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::DeleteTenant {
            qdrant,
            bot_id,
            yes,
        } => {
            if !yes {
                bail!("refusing to delete collection '{bot_id}' without --yes");
            }
            if qdrant.connect()?.delete_collection(&bot_id).await? {
                println!("deleted collection {bot_id}");
            } else {
                println!("collection {bot_id} did not exist");
            }
        }
        Command::DeleteDocument {
            qdrant,
            bot_id,
            document_id,
        } => {
            let service = qdrant.connect()?;
            let filter = document_filter(&document_id);
            let before = service.count_points(&bot_id, Some(filter.clone())).await?;
            service.delete_points(&bot_id, filter).await?;
            println!("deleted {before} points of {document_id} from {bot_id}");
        }
    }
    Ok(())
}
