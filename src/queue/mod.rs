//! Job queue: broker binding and message lifecycle.

pub mod amqp;
pub mod lifecycle;
pub mod types;

pub use amqp::{AmqpConsumer, AmqpQueue};
pub use lifecycle::{FailureKind, MessageLifecycleController, classify};
pub use types::{Disposition, MessageAcker, MessageSource, QueueError, QueueMessage};
