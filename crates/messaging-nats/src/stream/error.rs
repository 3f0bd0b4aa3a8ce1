use thiserror::Error;

/// Errors that can occur while resolving streams.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to create the stream.
    #[error("Failed to create stream: {0}")]
    Create(async_nats::jetstream::context::CreateStreamErrorKind),
}
