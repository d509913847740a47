//! RabbitMQ binding.
//!
//! The worker declares the job queue as durable, limits itself to one unacknowledged delivery
//! (prefetch 1), and settles every delivery explicitly. Jobs are published with persistent
//! delivery mode so they survive a broker restart. The channel runs in confirm mode, and a
//! publish only succeeds once the broker acks it.

use super::types::{MessageAcker, MessageSource, QueueError, QueueMessage};
use crate::processing::JobDescriptor;
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
    acker::Acker,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        BasicRejectOptions, ConfirmSelectOptions, QueueDeclareOptions,
    },
    publisher_confirm::Confirmation,
    types::FieldTable,
};

const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// Connection and channel bound to the durable job queue.
pub struct AmqpQueue {
    connection: Connection,
    channel: Channel,
    queue_name: String,
}

impl AmqpQueue {
    /// Connect to the broker, enable publisher confirms, and declare the durable job queue.
    pub async fn connect(uri: &str, queue_name: &str) -> Result<Self, QueueError> {
        let connection = Connection::connect(uri, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        tracing::info!(queue = queue_name, "Connected to broker");
        Ok(Self {
            connection,
            channel,
            queue_name: queue_name.to_string(),
        })
    }

    /// Name of the declared queue.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Start consuming with a prefetch of one delivery.
    pub async fn consumer(&self, consumer_tag: &str) -> Result<AmqpConsumer, QueueError> {
        self.channel
            .basic_qos(1, BasicQosOptions::default())
            .await?;
        let consumer = self
            .channel
            .basic_consume(
                &self.queue_name,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(AmqpConsumer { consumer })
    }

    /// Publish a job as a persistent JSON message and wait for the broker's confirmation.
    pub async fn publish(&self, job: &JobDescriptor) -> Result<(), QueueError> {
        let payload = serde_json::to_vec(job)?;
        let confirm = self
            .channel
            .basic_publish(
                "",
                &self.queue_name,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_delivery_mode(PERSISTENT_DELIVERY_MODE)
                    .with_content_type("application/json".into()),
            )
            .await?
            .await?;
        ensure_acked(&confirm, &self.queue_name)?;
        tracing::debug!(
            queue = %self.queue_name,
            document_id = %job.document_id,
            "Published job"
        );
        Ok(())
    }

    /// Close the channel and then the connection.
    pub async fn close(self) -> Result<(), QueueError> {
        self.channel.close(200, "worker shutting down").await?;
        self.connection.close(200, "worker shutting down").await?;
        Ok(())
    }
}

/// Deliveries from the job queue.
pub struct AmqpConsumer {
    consumer: Consumer,
}

#[async_trait]
impl MessageSource for AmqpConsumer {
    async fn next_message(&mut self) -> Option<Result<QueueMessage, QueueError>> {
        let delivery = match self.consumer.next().await? {
            Ok(delivery) => delivery,
            Err(error) => return Some(Err(error.into())),
        };
        Some(Ok(QueueMessage::new(
            delivery.data,
            delivery.redelivered,
            delivery.delivery_tag,
            Box::new(AmqpAcker {
                acker: delivery.acker,
            }),
        )))
    }
}

fn ensure_acked(confirmation: &Confirmation, queue_name: &str) -> Result<(), QueueError> {
    match confirmation {
        Confirmation::Ack(_) => Ok(()),
        Confirmation::Nack(_) => Err(QueueError::PublishNotConfirmed {
            queue: queue_name.to_string(),
            reason: "broker nacked the message",
        }),
        Confirmation::NotRequested => Err(QueueError::PublishNotConfirmed {
            queue: queue_name.to_string(),
            reason: "channel is not in confirm mode",
        }),
    }
}

struct AmqpAcker {
    acker: Acker,
}

#[async_trait]
impl MessageAcker for AmqpAcker {
    async fn ack(&self) -> Result<(), QueueError> {
        self.acker.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn reject(&self, requeue: bool) -> Result<(), QueueError> {
        self.acker.reject(BasicRejectOptions { requeue }).await?;
        Ok(())
    }
}
