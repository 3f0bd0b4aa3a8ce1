use std::error::Error as StdError;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::message::Message;

/// Marker trait for subscriber errors.
pub trait SubscriberError: StdError + Send + Sync + 'static {}

/// A subscriber delivers messages from topics until closed.
#[async_trait]
pub trait Subscriber
where
    Self: Send + Sync + 'static,
{
    /// The error type for the subscriber.
    type Error: SubscriberError;

    /// Subscribes to the topic and returns a channel of incoming messages.
    ///
    /// Each message stays unresolved at the broker until the receiver
    /// acks it; nacked and unresolved messages are redelivered. The
    /// channel closes once every worker serving the subscription has
    /// stopped, through either [`close`](Subscriber::close) or the
    /// `cancellation` token.
    async fn subscribe(
        &self,
        cancellation: CancellationToken,
        topic: &str,
    ) -> Result<mpsc::Receiver<Message>, Self::Error>;

    /// Stops all subscriptions and releases broker resources.
    ///
    /// Closing an already-closed subscriber is a no-op.
    async fn close(&self) -> Result<(), Self::Error>;
}

/// Provisions topic infrastructure ahead of subscribing.
#[async_trait]
pub trait SubscribeInitializer
where
    Self: Send + Sync + 'static,
{
    /// The error type for the initializer.
    type Error: SubscriberError;

    /// Ensures the topic can be subscribed to, without consuming from it.
    async fn subscribe_initialize(&self, topic: &str) -> Result<(), Self::Error>;
}
