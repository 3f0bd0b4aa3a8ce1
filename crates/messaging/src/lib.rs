//! Abstract interface for working with messaging systems: messages with
//! acknowledgements, subscribers, and publishers.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Messages and their acknowledgement lifecycle.
pub mod message;

/// Publishers write messages to topics.
pub mod publisher;

/// Subscribers deliver messages from topics.
pub mod subscriber;

pub use message::{Acknowledgment, Message, Metadata};
