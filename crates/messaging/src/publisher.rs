use std::error::Error as StdError;

use async_trait::async_trait;

use crate::message::Message;

/// Marker trait for publisher errors.
pub trait PublisherError: StdError + Send + Sync + 'static {}

/// A publisher writes messages to topics until closed.
#[async_trait]
pub trait Publisher
where
    Self: Send + Sync + 'static,
{
    /// The error type for the publisher.
    type Error: PublisherError;

    /// Publishes the messages to the topic, in order.
    async fn publish(&self, topic: &str, messages: Vec<Message>) -> Result<(), Self::Error>;

    /// Flushes pending messages and releases broker resources.
    async fn close(&self) -> Result<(), Self::Error>;
}
