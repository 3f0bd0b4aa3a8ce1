mod error;

pub use error::Error;

use std::sync::Arc;

use async_nats::jetstream::Context;
use async_nats::jetstream::stream::{Config as NatsStreamConfig, Stream as NatsStreamType};
use tracing::debug;

use crate::subject::SubjectCalculator;

/// Creates missing streams for subscribed topics.
///
/// A topic maps to a stream of the same name, binding every subject the
/// configured [`SubjectCalculator`] derives for it.
#[derive(Clone)]
pub struct StreamResolver {
    jetstream_context: Context,
    subject_calculator: Arc<dyn SubjectCalculator>,
}

impl StreamResolver {
    /// Creates a resolver using the given subject calculator.
    #[must_use]
    pub fn new(jetstream_context: Context, subject_calculator: Arc<dyn SubjectCalculator>) -> Self {
        Self {
            jetstream_context,
            subject_calculator,
        }
    }

    /// Returns the stream for the topic, creating it when missing.
    ///
    /// An existing stream is used as-is; its subject bindings are not
    /// reconciled with the calculator output.
    pub async fn ensure_stream(&self, topic: &str) -> Result<NatsStreamType, Error> {
        if let Ok(stream) = self.jetstream_context.get_stream(topic).await {
            debug!(topic, "stream already exists");
            return Ok(stream);
        }

        let subjects = self.subject_calculator.subjects(topic).all();
        debug!(topic, ?subjects, "creating stream");

        self.jetstream_context
            .create_stream(NatsStreamConfig {
                name: topic.to_string(),
                subjects,
                ..Default::default()
            })
            .await
            .map_err(|e| Error::Create(e.kind()))
    }
}
