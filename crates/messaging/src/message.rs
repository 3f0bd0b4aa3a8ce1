use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Message metadata as string key-value pairs.
pub type Metadata = HashMap<String, String>;

/// Resolution of a delivered message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Acknowledgment {
    /// The message was processed and must not be redelivered.
    Ack,

    /// The message could not be processed and should be redelivered.
    Nack,
}

#[derive(Debug, Default)]
struct AckState {
    resolution: Mutex<Option<Acknowledgment>>,
    notify: Notify,
}

impl AckState {
    fn resolve(&self, resolution: Acknowledgment) -> bool {
        let mut slot = self.resolution.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(resolution);
        drop(slot);

        self.notify.notify_waiters();
        true
    }

    async fn wait(&self) -> Acknowledgment {
        loop {
            // The Notified future must exist before the check runs.
            let notified = self.notify.notified();
            if let Some(resolution) = *self.resolution.lock() {
                return resolution;
            }
            notified.await;
        }
    }
}

/// A message consumed from, or published to, a topic.
///
/// Clones share the acknowledgement state: resolving any clone resolves
/// the message for all of them.
#[derive(Clone, Debug)]
pub struct Message {
    id: String,
    payload: Bytes,
    metadata: Metadata,
    ack: Arc<AckState>,
}

impl Message {
    /// Creates a message with an empty metadata map.
    #[must_use]
    pub fn new(id: impl Into<String>, payload: Bytes) -> Self {
        Self::with_metadata(id, payload, Metadata::new())
    }

    /// Creates a message carrying the given metadata.
    #[must_use]
    pub fn with_metadata(id: impl Into<String>, payload: Bytes, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            payload,
            metadata,
            ack: Arc::new(AckState::default()),
        }
    }

    /// Unique identifier of the message.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Raw payload bytes.
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Metadata attached to the message.
    #[must_use]
    pub const fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Mutable access to the metadata map.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Marks the message as processed.
    ///
    /// Returns `false` when the message was already resolved; the first
    /// resolution wins and later calls have no effect.
    pub fn ack(&self) -> bool {
        self.ack.resolve(Acknowledgment::Ack)
    }

    /// Requests redelivery of the message.
    ///
    /// Returns `false` when the message was already resolved.
    pub fn nack(&self) -> bool {
        self.ack.resolve(Acknowledgment::Nack)
    }

    /// Current resolution of the message, if any.
    #[must_use]
    pub fn resolution(&self) -> Option<Acknowledgment> {
        *self.ack.resolution.lock()
    }

    /// Waits until the message is acked or nacked.
    pub async fn acknowledgment(&self) -> Acknowledgment {
        self.ack.wait().await
    }
}
