use thiserror::Error;
use uuid::Uuid;
use weir_messaging::{Message, Metadata};

/// Header carrying the message identifier.
pub const ID_HEADER: &str = "Weir-Message-Id";

/// Prefix marking headers that carry message metadata.
pub const METADATA_PREFIX: &str = "Weir-";

/// Failed to decode a broker message.
#[derive(Debug, Error)]
#[error("cannot unmarshal message: {0}")]
pub struct UnmarshalError(Box<dyn std::error::Error + Send + Sync>);

impl UnmarshalError {
    /// Wraps the underlying decode failure.
    pub fn new(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(source.into())
    }
}

/// Decodes broker messages into [`Message`]s.
pub trait Unmarshaler: Send + Sync {
    /// Decodes the broker message.
    ///
    /// An error drops the message without acknowledgement; the broker
    /// redelivers it once the acknowledgement deadline passes.
    fn unmarshal(&self, message: &async_nats::Message) -> Result<Message, UnmarshalError>;
}

/// Reads the payload verbatim and lifts message headers into metadata.
///
/// The message identifier is taken from [`ID_HEADER`]; a message without
/// one is assigned a fresh UUID. Other headers prefixed with
/// [`METADATA_PREFIX`] become metadata entries under their stripped
/// names.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeaderUnmarshaler;

impl Unmarshaler for HeaderUnmarshaler {
    fn unmarshal(&self, message: &async_nats::Message) -> Result<Message, UnmarshalError> {
        let (id, metadata) = message.headers.as_ref().map_or_else(
            || (None, Metadata::new()),
            |headers| (message_id(headers), extract_metadata(headers)),
        );

        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(Message::with_metadata(id, message.payload.clone(), metadata))
    }
}

fn message_id(headers: &async_nats::HeaderMap) -> Option<String> {
    headers.get(ID_HEADER).map(ToString::to_string)
}

fn extract_metadata(headers: &async_nats::HeaderMap) -> Metadata {
    let mut metadata = Metadata::new();

    for (key, values) in headers.iter() {
        let key = key.to_string();
        if key == ID_HEADER {
            continue;
        }
        if let Some(stripped) = key.strip_prefix(METADATA_PREFIX) {
            let value = values.first().map(ToString::to_string).unwrap_or_default();
            metadata.insert(stripped.to_string(), value);
        }
    }

    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_nats::HeaderMap;

    #[test]
    fn reads_the_id_header() {
        let mut headers = HeaderMap::new();
        headers.insert(ID_HEADER, "message-17");

        assert_eq!(message_id(&headers), Some("message-17".to_string()));
    }

    #[test]
    fn missing_id_header_yields_none() {
        assert_eq!(message_id(&HeaderMap::new()), None);
    }

    #[test]
    fn strips_the_metadata_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert("Weir-Correlation-Id", "corr-1");
        headers.insert("Weir-Message-Id", "message-17");
        headers.insert("Nats-Msg-Id", "broker-internal");

        let metadata = extract_metadata(&headers);

        assert_eq!(metadata.get("Correlation-Id"), Some(&"corr-1".to_string()));
        assert!(!metadata.contains_key("Message-Id"));
        assert!(!metadata.contains_key("Msg-Id"));
        assert_eq!(metadata.len(), 1);
    }
}
