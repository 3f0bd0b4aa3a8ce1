mod error;

pub use error::Error;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_nats::Client as NatsClient;
use async_nats::jetstream::consumer::Consumer as NatsConsumerType;
use async_nats::jetstream::consumer::pull::Config as NatsConsumerConfig;
use async_nats::jetstream::{AckKind, Context};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};
use weir_messaging::subscriber::{SubscribeInitializer, Subscriber};
use weir_messaging::{Acknowledgment, Message};

use crate::marshaler::{HeaderUnmarshaler, Unmarshaler};
use crate::stream::StreamResolver;
use crate::subject::{
    DefaultDurableNameCalculator, DefaultQueueGroupCalculator, DefaultSubjectCalculator,
    DurableNameCalculator, QueueGroupCalculator, SubjectCalculator,
};

const DEFAULT_SUBSCRIBERS_COUNT: usize = 1;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const BACKLOG_DRAIN_LIMIT: usize = 100;

/// Connection-level configuration for [`NatsSubscriber::connect`].
pub struct SubscriberConfig {
    /// NATS server URL.
    pub url: String,

    /// Cluster the subscriber belongs to. Recorded for diagnostics; it
    /// has no wire meaning.
    pub cluster_id: Option<String>,

    /// Client name announced to the server.
    pub client_id: Option<String>,

    /// Queue group shared by the subscription workers.
    pub queue_group: Option<String>,

    /// Durable consumer name. Subscription state survives restarts.
    pub durable_name: Option<String>,

    /// Number of concurrent workers per subscription.
    pub subscribers_count: usize,

    /// How long `close` waits for workers to finish.
    pub close_timeout: Duration,

    /// How long a worker waits for a message to be acked or nacked.
    pub ack_wait_timeout: Duration,

    /// How long establishing a single subscription may take.
    pub subscribe_timeout: Duration,

    /// Low-level connection options, e.g. credentials.
    pub connect_options: Option<async_nats::ConnectOptions>,

    /// Decodes broker messages.
    pub unmarshaler: Arc<dyn Unmarshaler>,

    /// Overrides subject naming.
    pub subject_calculator: Option<Arc<dyn SubjectCalculator>>,

    /// Overrides durable consumer naming.
    pub durable_name_calculator: Option<Arc<dyn DurableNameCalculator>>,

    /// Overrides queue group naming.
    pub queue_group_calculator: Option<Arc<dyn QueueGroupCalculator>>,
}

impl SubscriberConfig {
    /// Creates a configuration with defaults for everything but the URL:
    /// a single worker per subscription, thirty-second timeouts, and
    /// [`HeaderUnmarshaler`] decoding.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cluster_id: None,
            client_id: None,
            queue_group: None,
            durable_name: None,
            subscribers_count: DEFAULT_SUBSCRIBERS_COUNT,
            close_timeout: DEFAULT_TIMEOUT,
            ack_wait_timeout: DEFAULT_TIMEOUT,
            subscribe_timeout: DEFAULT_TIMEOUT,
            connect_options: None,
            unmarshaler: Arc::new(HeaderUnmarshaler),
            subject_calculator: None,
            durable_name_calculator: None,
            queue_group_calculator: None,
        }
    }

    /// Derives the per-subscription part of the configuration.
    #[must_use]
    pub fn subscription_config(&self) -> SubscriberSubscriptionConfig {
        SubscriberSubscriptionConfig {
            queue_group: self.queue_group.clone(),
            durable_name: self.durable_name.clone(),
            subscribers_count: self.subscribers_count,
            close_timeout: self.close_timeout,
            ack_wait_timeout: self.ack_wait_timeout,
            subscribe_timeout: self.subscribe_timeout,
            unmarshaler: self.unmarshaler.clone(),
            subject_calculator: self.subject_calculator.clone(),
            durable_name_calculator: self.durable_name_calculator.clone(),
            queue_group_calculator: self.queue_group_calculator.clone(),
        }
    }
}

/// Per-subscription configuration for [`NatsSubscriber::with_client`].
#[derive(Clone)]
pub struct SubscriberSubscriptionConfig {
    /// Queue group shared by the subscription workers.
    pub queue_group: Option<String>,

    /// Durable consumer name. Subscription state survives restarts.
    pub durable_name: Option<String>,

    /// Number of concurrent workers per subscription.
    pub subscribers_count: usize,

    /// How long `close` waits for workers to finish.
    pub close_timeout: Duration,

    /// How long a worker waits for a message to be acked or nacked.
    pub ack_wait_timeout: Duration,

    /// How long establishing a single subscription may take.
    pub subscribe_timeout: Duration,

    /// Decodes broker messages.
    pub unmarshaler: Arc<dyn Unmarshaler>,

    /// Overrides subject naming.
    pub subject_calculator: Option<Arc<dyn SubjectCalculator>>,

    /// Overrides durable consumer naming.
    pub durable_name_calculator: Option<Arc<dyn DurableNameCalculator>>,

    /// Overrides queue group naming.
    pub queue_group_calculator: Option<Arc<dyn QueueGroupCalculator>>,
}

impl SubscriberSubscriptionConfig {
    /// Creates a configuration with a single worker per subscription,
    /// thirty-second timeouts, and [`HeaderUnmarshaler`] decoding.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue_group: None,
            durable_name: None,
            subscribers_count: DEFAULT_SUBSCRIBERS_COUNT,
            close_timeout: DEFAULT_TIMEOUT,
            ack_wait_timeout: DEFAULT_TIMEOUT,
            subscribe_timeout: DEFAULT_TIMEOUT,
            unmarshaler: Arc::new(HeaderUnmarshaler),
            subject_calculator: None,
            durable_name_calculator: None,
            queue_group_calculator: None,
        }
    }

    fn set_defaults(&mut self) {
        if self.subscribers_count == 0 {
            self.subscribers_count = DEFAULT_SUBSCRIBERS_COUNT;
        }
        if self.close_timeout.is_zero() {
            self.close_timeout = DEFAULT_TIMEOUT;
        }
        if self.ack_wait_timeout.is_zero() {
            self.ack_wait_timeout = DEFAULT_TIMEOUT;
        }
        if self.subscribe_timeout.is_zero() {
            self.subscribe_timeout = DEFAULT_TIMEOUT;
        }
        if self.queue_group.as_deref().is_some_and(str::is_empty) {
            self.queue_group = None;
        }
        if self.durable_name.as_deref().is_some_and(str::is_empty) {
            self.durable_name = None;
        }
    }

    fn validate(&self) -> Result<(), Error> {
        if self.subscribers_count > 1 && self.queue_group.is_none() {
            return Err(Error::QueueGroupRequired);
        }
        Ok(())
    }
}

impl Default for SubscriberSubscriptionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscriber backed by NATS JetStream pull consumers.
///
/// Each subscription runs `subscribers_count` workers pulling from the
/// topic's stream and forwarding decoded messages into a bounded
/// channel. A delivery is acknowledged to the broker only once the
/// receiver resolves it; everything else is left to ack-wait
/// redelivery.
pub struct NatsSubscriber {
    client: NatsClient,
    jetstream_context: Context,
    config: SubscriberSubscriptionConfig,
    subject_calculator: Arc<dyn SubjectCalculator>,
    durable_name_calculator: Arc<dyn DurableNameCalculator>,
    queue_group_calculator: Arc<dyn QueueGroupCalculator>,
    resolver: StreamResolver,
    closing: CancellationToken,
    closed: Mutex<bool>,
    tasks: TaskTracker,
}

impl NatsSubscriber {
    /// Connects to the NATS server and creates a subscriber.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or the
    /// configuration is invalid.
    pub async fn connect(config: SubscriberConfig) -> Result<Self, Error> {
        let mut subscription_config = config.subscription_config();
        subscription_config.set_defaults();
        subscription_config.validate()?;

        let SubscriberConfig {
            url,
            cluster_id,
            client_id,
            connect_options,
            ..
        } = config;

        let mut options = connect_options.unwrap_or_default();
        if let Some(client_id) = client_id {
            options = options.name(client_id);
        }

        debug!(url = %url, cluster_id = ?cluster_id, "connecting to NATS");
        let client = options.connect(url.as_str()).await?;

        Self::with_client(client, subscription_config)
    }

    /// Creates a subscriber on an existing client connection.
    ///
    /// Zero-valued counts and timeouts are replaced with their defaults
    /// before validation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueGroupRequired`] when more than one worker
    /// is configured without a queue group.
    pub fn with_client(
        client: NatsClient,
        mut config: SubscriberSubscriptionConfig,
    ) -> Result<Self, Error> {
        config.set_defaults();
        config.validate()?;

        let jetstream_context = async_nats::jetstream::new(client.clone());

        let subject_calculator = config
            .subject_calculator
            .clone()
            .unwrap_or_else(|| Arc::new(DefaultSubjectCalculator));
        let durable_name_calculator = config
            .durable_name_calculator
            .clone()
            .unwrap_or_else(|| Arc::new(DefaultDurableNameCalculator));
        let queue_group_calculator = config
            .queue_group_calculator
            .clone()
            .unwrap_or_else(|| Arc::new(DefaultQueueGroupCalculator));

        let resolver = StreamResolver::new(jetstream_context.clone(), subject_calculator.clone());

        Ok(Self {
            client,
            jetstream_context,
            config,
            subject_calculator,
            durable_name_calculator,
            queue_group_calculator,
            resolver,
            closing: CancellationToken::new(),
            closed: Mutex::new(false),
            tasks: TaskTracker::new(),
        })
    }

    fn consumer_config(&self, topic: &str) -> NatsConsumerConfig {
        consumer_config(
            &self.config,
            self.subject_calculator.subjects(topic).primary,
            self.config
                .durable_name
                .as_deref()
                .map(|durable| self.durable_name_calculator.durable_name(durable, topic)),
            self.config
                .queue_group
                .as_deref()
                .map(|group| self.queue_group_calculator.queue_group(group, topic)),
        )
    }

    async fn create_consumer(
        &self,
        topic: &str,
        consumer_config: NatsConsumerConfig,
    ) -> Result<NatsConsumerType<NatsConsumerConfig>, Error> {
        match tokio::time::timeout(
            self.config.subscribe_timeout,
            self.jetstream_context
                .create_consumer_on_stream(consumer_config, topic),
        )
        .await
        {
            Ok(result) => result.map_err(|e| Error::ConsumerCreate(e.kind())),
            Err(_) => Err(Error::SubscribeTimeout),
        }
    }
}

#[async_trait]
impl Subscriber for NatsSubscriber {
    type Error = Error;

    async fn subscribe(
        &self,
        cancellation: CancellationToken,
        topic: &str,
    ) -> Result<mpsc::Receiver<Message>, Error> {
        if self.closing.is_cancelled() {
            return Err(Error::Closed);
        }

        let consumer_config = self.consumer_config(topic);
        let durable = consumer_config.durable_name.is_some();

        let (output, receiver) = mpsc::channel(1);
        let mut workers = Vec::with_capacity(self.config.subscribers_count);
        let mut removable_consumers = BTreeSet::new();

        for index in 0..self.config.subscribers_count {
            let consumer = self.create_consumer(topic, consumer_config.clone()).await?;
            if !durable {
                removable_consumers.insert(consumer.cached_info().name.clone());
            }

            debug!(topic, worker = index, "starting subscription worker");
            let worker = SubscriptionWorker {
                index,
                topic: topic.to_string(),
                consumer,
                output: output.clone(),
                unmarshaler: self.config.unmarshaler.clone(),
                ack_wait_timeout: self.config.ack_wait_timeout,
                closing: self.closing.clone(),
                cancellation: cancellation.clone(),
            };
            workers.push(self.tasks.spawn(worker.run()));
        }

        self.tasks.spawn(finish_subscription(
            self.jetstream_context.clone(),
            topic.to_string(),
            workers,
            removable_consumers,
        ));

        Ok(receiver)
    }

    async fn close(&self) -> Result<(), Error> {
        {
            let mut closed = self.closed.lock().await;
            if *closed {
                return Ok(());
            }
            *closed = true;
        }

        debug!("closing subscriber");
        self.closing.cancel();
        self.tasks.close();

        let finished_in_time = tokio::time::timeout(self.config.close_timeout, self.tasks.wait())
            .await
            .is_ok();

        // Drain is attempted even when workers overrun the timeout.
        let drained = self.client.drain().await;

        if !finished_in_time {
            return Err(Error::CloseTimeout);
        }
        drained.map_err(|e| Error::Drain(e.into()))?;

        info!("subscriber closed");
        Ok(())
    }
}

#[async_trait]
impl SubscribeInitializer for NatsSubscriber {
    type Error = Error;

    /// Ensures the topic's stream exists and nacks its backlog through a
    /// throwaway consumer, leaving every message available for real
    /// subscriptions.
    async fn subscribe_initialize(&self, topic: &str) -> Result<(), Error> {
        let stream = self.resolver.ensure_stream(topic).await?;

        // Always a fresh ephemeral consumer: draining through the
        // configured durable would advance its position.
        let consumer_config = NatsConsumerConfig {
            filter_subject: self.subject_calculator.subjects(topic).primary,
            inactive_threshold: self.config.ack_wait_timeout,
            ..Default::default()
        };
        let consumer = self.create_consumer(topic, consumer_config).await?;
        let consumer_name = consumer.cached_info().name.clone();

        let mut backlog = consumer
            .fetch()
            .max_messages(BACKLOG_DRAIN_LIMIT)
            .messages()
            .await
            .map_err(|e| Error::Fetch(e.into()))?;

        while let Some(next) = backlog.next().await {
            match next {
                Ok(message) => {
                    trace!(topic, subject = %message.subject, "nacking message during subscribe initialize");
                    if let Err(err) = message.ack_with(AckKind::Nak(None)).await {
                        error!(topic, %err, "cannot nack message during subscribe initialize");
                    }
                }
                Err(err) => {
                    warn!(topic, %err, "cannot drain backlog during subscribe initialize");
                    break;
                }
            }
        }

        stream
            .delete_consumer(&consumer_name)
            .await
            .map_err(|e| Error::ConsumerRemove(e.into()))?;

        Ok(())
    }
}

/// Derives the pull consumer configuration for one subscription.
///
/// A durable name pins the consumer identity and is never cleaned up.
/// Without one, a queue group maps to a shared named consumer and plain
/// subscriptions get a server-named ephemeral; both carry an inactivity
/// threshold so the server reaps them if the process dies.
fn consumer_config(
    config: &SubscriberSubscriptionConfig,
    primary_subject: String,
    durable_name: Option<String>,
    queue_group: Option<String>,
) -> NatsConsumerConfig {
    let mut consumer_config = NatsConsumerConfig {
        filter_subject: primary_subject,
        ack_wait: config.ack_wait_timeout,
        ..Default::default()
    };

    if let Some(durable) = durable_name {
        consumer_config.durable_name = Some(durable);
    } else {
        consumer_config.inactive_threshold = config.ack_wait_timeout;
        if let Some(group) = queue_group {
            consumer_config.name = Some(consumer_name(&group));
        }
    }

    consumer_config
}

/// Consumer names cannot contain subject token separators.
fn consumer_name(name: &str) -> String {
    name.replace('.', "_")
}

async fn finish_subscription(
    jetstream_context: Context,
    topic: String,
    workers: Vec<JoinHandle<()>>,
    removable_consumers: BTreeSet<String>,
) {
    for worker in workers {
        if let Err(err) = worker.await {
            error!(topic = %topic, %err, "subscription worker panicked");
        }
    }

    remove_consumers(&jetstream_context, &topic, &removable_consumers).await;

    debug!(topic = %topic, "subscription finished, output channel closed");
}

async fn remove_consumers(
    jetstream_context: &Context,
    topic: &str,
    removable_consumers: &BTreeSet<String>,
) {
    if removable_consumers.is_empty() {
        return;
    }

    let stream = match jetstream_context.get_stream(topic).await {
        Ok(stream) => stream,
        Err(err) => {
            warn!(topic, %err, "cannot look up stream to remove consumers");
            return;
        }
    };

    for name in removable_consumers {
        if let Err(err) = stream.delete_consumer(name).await {
            warn!(topic, consumer = %name, %err, "cannot remove consumer");
        } else {
            debug!(topic, consumer = %name, "removed consumer");
        }
    }
}

struct SubscriptionWorker {
    index: usize,
    topic: String,
    consumer: NatsConsumerType<NatsConsumerConfig>,
    output: mpsc::Sender<Message>,
    unmarshaler: Arc<dyn Unmarshaler>,
    ack_wait_timeout: Duration,
    closing: CancellationToken,
    cancellation: CancellationToken,
}

impl SubscriptionWorker {
    async fn run(self) {
        let mut messages = match self.consumer.messages().await {
            Ok(messages) => messages,
            Err(err) => {
                error!(topic = %self.topic, worker = self.index, %err, "cannot start consuming");
                return;
            }
        };

        loop {
            tokio::select! {
                biased;

                () = self.closing.cancelled() => break,
                () = self.cancellation.cancelled() => break,
                next = messages.next() => match next {
                    Some(Ok(delivery)) => self.process_message(delivery).await,
                    Some(Err(err)) => {
                        error!(topic = %self.topic, worker = self.index, %err, "cannot receive message");
                    }
                    None => break,
                },
            }
        }

        // Dropping the message stream removes this worker's pull
        // interest; shared consumers are removed only after the last
        // worker stopped.
        debug!(topic = %self.topic, worker = self.index, "subscription worker stopped");
    }

    async fn process_message(&self, delivery: async_nats::jetstream::Message) {
        trace!(topic = %self.topic, worker = self.index, subject = %delivery.subject, "received message");

        let message = match self.unmarshaler.unmarshal(&delivery) {
            Ok(message) => message,
            Err(err) => {
                error!(topic = %self.topic, worker = self.index, %err, "cannot unmarshal message, dropping");
                return;
            }
        };

        let message_id = message.id().to_string();
        let ack_handle = message.clone();

        tokio::select! {
            sent = self.output.send(message) => {
                if sent.is_err() {
                    trace!(topic = %self.topic, message_id = %message_id, "receiver dropped, message discarded");
                    return;
                }
                trace!(topic = %self.topic, message_id = %message_id, "message sent to consumer");
            }
            () = self.closing.cancelled() => {
                trace!(topic = %self.topic, message_id = %message_id, "closing, message discarded");
                return;
            }
            () = self.cancellation.cancelled() => {
                trace!(topic = %self.topic, message_id = %message_id, "subscription cancelled, message discarded");
                return;
            }
        }

        match wait_for_acknowledgment(
            &ack_handle,
            &delivery,
            self.ack_wait_timeout,
            &self.closing,
            &self.cancellation,
        )
        .await
        {
            AckOutcome::Acked => {
                trace!(topic = %self.topic, message_id = %message_id, "message acked");
            }
            AckOutcome::Nacked => {
                trace!(topic = %self.topic, message_id = %message_id, "message nacked");
            }
            AckOutcome::TimedOut => {
                warn!(topic = %self.topic, message_id = %message_id, "ack timeout, message will be redelivered");
            }
            AckOutcome::Discarded => {
                trace!(topic = %self.topic, message_id = %message_id, "closing, message discarded before ack");
            }
        }
    }
}

/// Outcome of waiting for a delivery to be resolved.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum AckOutcome {
    Acked,
    Nacked,
    TimedOut,
    Discarded,
}

/// Acknowledgement side of a broker delivery.
#[async_trait]
trait Acker: Send + Sync {
    async fn resolve(&self, resolution: Acknowledgment) -> Result<(), async_nats::Error>;
}

#[async_trait]
impl Acker for async_nats::jetstream::Message {
    async fn resolve(&self, resolution: Acknowledgment) -> Result<(), async_nats::Error> {
        match resolution {
            Acknowledgment::Ack => self.ack().await,
            Acknowledgment::Nack => self.ack_with(AckKind::Nak(None)).await,
        }
    }
}

/// Forwards the message's resolution to the broker, or gives up once
/// the ack timeout passes or the subscription is torn down. Unresolved
/// deliveries are redelivered by the broker after its ack-wait.
async fn wait_for_acknowledgment(
    message: &Message,
    delivery: &impl Acker,
    ack_wait_timeout: Duration,
    closing: &CancellationToken,
    cancellation: &CancellationToken,
) -> AckOutcome {
    tokio::select! {
        resolution = message.acknowledgment() => {
            if let Err(err) = delivery.resolve(resolution).await {
                error!(message_id = %message.id(), %err, "cannot send acknowledgement");
            }
            match resolution {
                Acknowledgment::Ack => AckOutcome::Acked,
                Acknowledgment::Nack => AckOutcome::Nacked,
            }
        }
        () = tokio::time::sleep(ack_wait_timeout) => AckOutcome::TimedOut,
        () = closing.cancelled() => AckOutcome::Discarded,
        () = cancellation.cancelled() => AckOutcome::Discarded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bytes::Bytes;

    #[derive(Default)]
    struct RecordingAcker {
        resolutions: std::sync::Mutex<Vec<Acknowledgment>>,
    }

    impl RecordingAcker {
        fn resolutions(&self) -> Vec<Acknowledgment> {
            self.resolutions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Acker for RecordingAcker {
        async fn resolve(&self, resolution: Acknowledgment) -> Result<(), async_nats::Error> {
            self.resolutions.lock().unwrap().push(resolution);
            Ok(())
        }
    }

    fn test_config() -> SubscriberSubscriptionConfig {
        SubscriberSubscriptionConfig::new()
    }

    #[test]
    fn set_defaults_fills_zero_values() {
        let mut config = test_config();
        config.subscribers_count = 0;
        config.close_timeout = Duration::ZERO;
        config.ack_wait_timeout = Duration::ZERO;
        config.subscribe_timeout = Duration::ZERO;

        config.set_defaults();

        assert_eq!(config.subscribers_count, 1);
        assert_eq!(config.close_timeout, Duration::from_secs(30));
        assert_eq!(config.ack_wait_timeout, Duration::from_secs(30));
        assert_eq!(config.subscribe_timeout, Duration::from_secs(30));
    }

    #[test]
    fn set_defaults_keeps_explicit_values() {
        let mut config = test_config();
        config.subscribers_count = 3;
        config.queue_group = Some("workers".to_string());
        config.close_timeout = Duration::from_secs(5);

        config.set_defaults();

        assert_eq!(config.subscribers_count, 3);
        assert_eq!(config.close_timeout, Duration::from_secs(5));
    }

    #[test]
    fn set_defaults_drops_empty_names() {
        let mut config = test_config();
        config.queue_group = Some(String::new());
        config.durable_name = Some(String::new());

        config.set_defaults();

        assert!(config.queue_group.is_none());
        assert!(config.durable_name.is_none());
    }

    #[test]
    fn multiple_workers_require_a_queue_group() {
        let mut config = test_config();
        config.subscribers_count = 4;

        assert!(matches!(
            config.validate(),
            Err(Error::QueueGroupRequired)
        ));

        config.queue_group = Some("workers".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn single_worker_needs_no_queue_group() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn durable_subscriptions_get_durable_consumers() {
        let derived = consumer_config(
            &test_config(),
            "orders.*".to_string(),
            Some("billing_orders".to_string()),
            None,
        );

        assert_eq!(derived.durable_name.as_deref(), Some("billing_orders"));
        assert_eq!(derived.filter_subject, "orders.*");
        assert_eq!(derived.ack_wait, Duration::from_secs(30));
        assert!(derived.inactive_threshold.is_zero());
    }

    #[test]
    fn queue_group_subscriptions_share_a_named_consumer() {
        let derived = consumer_config(
            &test_config(),
            "orders.*".to_string(),
            None,
            Some("workers.orders".to_string()),
        );

        assert_eq!(derived.name.as_deref(), Some("workers_orders"));
        assert!(derived.durable_name.is_none());
        assert_eq!(derived.inactive_threshold, Duration::from_secs(30));
    }

    #[test]
    fn plain_subscriptions_get_ephemeral_consumers() {
        let derived = consumer_config(&test_config(), "orders.*".to_string(), None, None);

        assert!(derived.name.is_none());
        assert!(derived.durable_name.is_none());
        assert_eq!(derived.inactive_threshold, Duration::from_secs(30));
    }

    #[test]
    fn durable_name_wins_over_queue_group() {
        let derived = consumer_config(
            &test_config(),
            "orders.*".to_string(),
            Some("billing_orders".to_string()),
            Some("workers.orders".to_string()),
        );

        assert_eq!(derived.durable_name.as_deref(), Some("billing_orders"));
        assert!(derived.name.is_none());
    }

    #[tokio::test]
    async fn acked_message_reaches_the_broker_once() {
        let acker = RecordingAcker::default();
        let message = Message::new("m-1", Bytes::new());
        let closing = CancellationToken::new();
        let cancellation = CancellationToken::new();

        message.ack();
        let outcome = wait_for_acknowledgment(
            &message,
            &acker,
            Duration::from_secs(30),
            &closing,
            &cancellation,
        )
        .await;

        assert_eq!(outcome, AckOutcome::Acked);
        assert_eq!(acker.resolutions(), vec![Acknowledgment::Ack]);
    }

    #[tokio::test]
    async fn nacked_message_requests_redelivery() {
        let acker = RecordingAcker::default();
        let message = Message::new("m-2", Bytes::new());
        let closing = CancellationToken::new();
        let cancellation = CancellationToken::new();

        message.nack();
        let outcome = wait_for_acknowledgment(
            &message,
            &acker,
            Duration::from_secs(30),
            &closing,
            &cancellation,
        )
        .await;

        assert_eq!(outcome, AckOutcome::Nacked);
        assert_eq!(acker.resolutions(), vec![Acknowledgment::Nack]);
    }

    #[tokio::test(start_paused = true)]
    async fn unresolved_message_times_out_without_broker_traffic() {
        let acker = RecordingAcker::default();
        let message = Message::new("m-3", Bytes::new());
        let closing = CancellationToken::new();
        let cancellation = CancellationToken::new();

        let outcome = wait_for_acknowledgment(
            &message,
            &acker,
            Duration::from_secs(30),
            &closing,
            &cancellation,
        )
        .await;

        assert_eq!(outcome, AckOutcome::TimedOut);
        assert!(acker.resolutions().is_empty());
    }

    #[tokio::test]
    async fn closing_discards_waiting_messages() {
        let acker = RecordingAcker::default();
        let message = Message::new("m-4", Bytes::new());
        let closing = CancellationToken::new();
        let cancellation = CancellationToken::new();

        closing.cancel();
        let outcome = wait_for_acknowledgment(
            &message,
            &acker,
            Duration::from_secs(30),
            &closing,
            &cancellation,
        )
        .await;

        assert_eq!(outcome, AckOutcome::Discarded);
        assert!(acker.resolutions().is_empty());
    }

    #[tokio::test]
    async fn cancellation_discards_waiting_messages() {
        let acker = RecordingAcker::default();
        let message = Message::new("m-5", Bytes::new());
        let closing = CancellationToken::new();
        let cancellation = CancellationToken::new();

        cancellation.cancel();
        let outcome = wait_for_acknowledgment(
            &message,
            &acker,
            Duration::from_secs(30),
            &closing,
            &cancellation,
        )
        .await;

        assert_eq!(outcome, AckOutcome::Discarded);
        assert!(acker.resolutions().is_empty());
    }

    #[tokio::test]
    async fn resolution_after_discard_stays_local() {
        let acker = RecordingAcker::default();
        let message = Message::new("m-6", Bytes::new());
        let closing = CancellationToken::new();
        let cancellation = CancellationToken::new();

        closing.cancel();
        let outcome = wait_for_acknowledgment(
            &message,
            &acker,
            Duration::from_secs(30),
            &closing,
            &cancellation,
        )
        .await;
        assert_eq!(outcome, AckOutcome::Discarded);

        // The handler can still resolve its copy, but nothing reaches
        // the broker anymore.
        assert!(message.ack());
        assert!(acker.resolutions().is_empty());
    }
}
