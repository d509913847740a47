//! Broker-agnostic message types.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Errors raised by the message broker binding.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Broker protocol or connection failure.
    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),
    /// The broker did not ack a published message.
    #[error("broker did not confirm publish to '{queue}': {reason}")]
    PublishNotConfirmed {
        /// Target queue.
        queue: String,
        /// Why the publish is unconfirmed.
        reason: &'static str,
    },
    /// A job could not be serialized for publishing.
    #[error("failed to encode job: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Terminal decision for a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processing succeeded; remove the message.
    Acknowledge,
    /// Permanent failure; drop (or dead-letter) the message.
    RejectNoRequeue,
    /// Transient failure; return the message to the queue.
    RejectRequeue,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Acknowledge => "acknowledged",
            Self::RejectNoRequeue => "rejected",
            Self::RejectRequeue => "requeued",
        };
        f.write_str(label)
    }
}

/// Settles a single delivery with the broker.
#[async_trait]
pub trait MessageAcker: Send + Sync {
    /// Acknowledge the delivery.
    async fn ack(&self) -> Result<(), QueueError>;
    /// Reject the delivery, optionally returning it to the queue.
    async fn reject(&self, requeue: bool) -> Result<(), QueueError>;
}

/// A delivery awaiting settlement.
pub struct QueueMessage {
    /// Raw message body.
    pub body: Vec<u8>,
    /// Whether the broker has delivered this message before.
    pub redelivered: bool,
    /// Broker-assigned delivery tag.
    pub delivery_tag: u64,
    acker: Box<dyn MessageAcker>,
}

impl QueueMessage {
    /// Wrap a delivery and the handle that settles it.
    pub fn new(
        body: Vec<u8>,
        redelivered: bool,
        delivery_tag: u64,
        acker: Box<dyn MessageAcker>,
    ) -> Self {
        Self {
            body,
            redelivered,
            delivery_tag,
            acker,
        }
    }

    /// Settle the delivery. Consumes the message so it is settled exactly once.
    pub async fn settle(self, disposition: Disposition) -> Result<(), QueueError> {
        match disposition {
            Disposition::Acknowledge => self.acker.ack().await,
            Disposition::RejectNoRequeue => self.acker.reject(false).await,
            Disposition::RejectRequeue => self.acker.reject(true).await,
        }
    }
}

impl fmt::Debug for QueueMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueMessage")
            .field("bytes", &self.body.len())
            .field("redelivered", &self.redelivered)
            .field("delivery_tag", &self.delivery_tag)
            .finish()
    }
}

/// Stream of deliveries from a queue.
#[async_trait]
pub trait MessageSource: Send {
    /// Wait for the next delivery; `None` once the consumer has been cancelled.
    async fn next_message(&mut self) -> Option<Result<QueueMessage, QueueError>>;
}
