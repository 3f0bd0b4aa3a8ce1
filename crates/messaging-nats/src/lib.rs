//! NATS JetStream implementation of the weir messaging subscriber.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Decoding of broker messages into [`weir_messaging::Message`]s.
pub mod marshaler;

/// Stream provisioning for subscribed topics.
pub mod stream;

/// Subject, durable name, and queue group naming.
pub mod subject;

/// The JetStream-backed subscriber.
pub mod subscriber;

pub use marshaler::{HeaderUnmarshaler, Unmarshaler};
pub use subject::publish_subject;
pub use subscriber::{NatsSubscriber, SubscriberConfig, SubscriberSubscriptionConfig};
