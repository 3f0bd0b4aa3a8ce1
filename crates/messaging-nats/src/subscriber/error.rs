use thiserror::Error;
use weir_messaging::subscriber::SubscriberError;

/// Errors that can occur in the JetStream subscriber.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection to the NATS server failed.
    #[error("Failed to connect to NATS: {0}")]
    Connect(#[from] async_nats::ConnectError),

    /// More than one worker requires a queue group, otherwise every
    /// worker would receive its own copy of each message.
    #[error("subscribers_count greater than one requires a queue_group")]
    QueueGroupRequired,

    /// The subscriber has been closed.
    #[error("Subscriber is closed")]
    Closed,

    /// Stream resolution failed.
    #[error(transparent)]
    Stream(#[from] crate::stream::Error),

    /// Consumer create error.
    #[error("Failed to create consumer: {0}")]
    ConsumerCreate(async_nats::jetstream::stream::ConsumerErrorKind),

    /// Consumer removal failed after draining the backlog.
    #[error("Failed to remove consumer after subscribe initialize: {0}")]
    ConsumerRemove(async_nats::Error),

    /// Establishing a subscription exceeded the subscribe timeout.
    #[error("Timed out establishing subscription")]
    SubscribeTimeout,

    /// Fetching the topic backlog failed.
    #[error("Failed to fetch backlog: {0}")]
    Fetch(async_nats::Error),

    /// Workers did not stop within the close timeout.
    #[error("Subscription workers did not stop within the close timeout")]
    CloseTimeout,

    /// Draining the NATS connection failed.
    #[error("Failed to drain connection: {0}")]
    Drain(async_nats::Error),
}

impl SubscriberError for Error {}
