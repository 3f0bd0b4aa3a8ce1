/// Subjects covered by a topic subscription.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Subjects {
    /// Subject the subscription consumes from.
    pub primary: String,

    /// Extra subjects bound to the topic's stream.
    pub additional: Vec<String>,
}

impl Subjects {
    /// Primary subject followed by the additional subjects.
    #[must_use]
    pub fn all(&self) -> Vec<String> {
        let mut all = Vec::with_capacity(1 + self.additional.len());
        all.push(self.primary.clone());
        all.extend(self.additional.iter().cloned());
        all
    }
}

/// Derives the broker subjects for a topic.
pub trait SubjectCalculator: Send + Sync {
    /// Subjects the topic maps to.
    fn subjects(&self, topic: &str) -> Subjects;
}

/// Covers everything published one token under the topic.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultSubjectCalculator;

impl SubjectCalculator for DefaultSubjectCalculator {
    fn subjects(&self, topic: &str) -> Subjects {
        Subjects {
            primary: format!("{topic}.*"),
            additional: Vec::new(),
        }
    }
}

/// Derives durable consumer names for a topic.
pub trait DurableNameCalculator: Send + Sync {
    /// Durable name scoped to the topic.
    fn durable_name(&self, durable: &str, topic: &str) -> String;
}

/// Appends the topic to the durable name, replacing subject token
/// separators so the result stays a valid consumer name.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultDurableNameCalculator;

impl DurableNameCalculator for DefaultDurableNameCalculator {
    fn durable_name(&self, durable: &str, topic: &str) -> String {
        format!("{durable}_{}", topic.replace('.', "_"))
    }
}

/// Derives queue group names for a topic.
pub trait QueueGroupCalculator: Send + Sync {
    /// Queue group scoped to the topic.
    fn queue_group(&self, group: &str, topic: &str) -> String;
}

/// Scopes the configured group to the topic.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultQueueGroupCalculator;

impl QueueGroupCalculator for DefaultQueueGroupCalculator {
    fn queue_group(&self, group: &str, topic: &str) -> String {
        format!("{group}.{topic}")
    }
}

/// Subject a message with the given identifier is published under.
///
/// Publishing here lands the message one token below the topic, inside
/// the wildcard covered by [`DefaultSubjectCalculator`].
#[must_use]
pub fn publish_subject(topic: &str, message_id: &str) -> String {
    format!("{topic}.{message_id}")
}
