//! `rdkafka`-backed [`EventPublisher`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use ondc_edge_core::config::EdgeConfig;
use ondc_edge_core::error::PublishError;
use ondc_edge_core::ports::EventPublisher;
use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

/// Failure building the producer.
#[derive(Debug, thiserror::Error)]
pub enum KafkaSetupError {
    /// No bootstrap broker was given.
    #[error("no kafka brokers configured")]
    NoBrokers,

    /// librdkafka rejected the client configuration.
    #[error("failed to create kafka producer: {0}")]
    Client(#[from] KafkaError),
}

/// Producer settings.
#[derive(Debug, Clone, TypedBuilder)]
pub struct KafkaPublisherConfig {
    /// Bootstrap brokers, `host:port`.
    pub brokers: Vec<String>,

    /// Client id reported to the brokers.
    #[builder(default = String::from("ondc-edge"), setter(into))]
    pub client_id: String,

    /// Upper bound on one publish, also used as `message.timeout.ms`.
    #[builder(default = Duration::from_secs(10))]
    pub publish_timeout: Duration,
}

impl KafkaPublisherConfig {
    /// Take the `KAFKA_*` settings from the service configuration.
    #[must_use]
    pub fn from_config(config: &EdgeConfig) -> Self {
        Self::builder()
            .brokers(config.kafka_brokers.clone())
            .publish_timeout(config.publish_timeout())
            .build()
    }

    fn client_config(&self) -> ClientConfig {
        let mut client = ClientConfig::new();
        client
            .set("bootstrap.servers", self.brokers.join(","))
            .set("client.id", &self.client_id)
            .set("acks", "all")
            .set("message.timeout.ms", message_timeout_ms(self.publish_timeout));
        client
    }
}

/// Publishes keyed messages and waits for `acks=all` delivery reports.
#[derive(Clone)]
pub struct KafkaPublisher {
    producer: FutureProducer,
    brokers: String,
    publish_timeout: Duration,
}

impl fmt::Debug for KafkaPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KafkaPublisher")
            .field("brokers", &self.brokers)
            .field("publish_timeout", &self.publish_timeout)
            .finish_non_exhaustive()
    }
}

impl KafkaPublisher {
    /// Create the producer. No connection is made until the first publish.
    pub fn new(config: &KafkaPublisherConfig) -> Result<Self, KafkaSetupError> {
        let brokers: Vec<&str> = config
            .brokers
            .iter()
            .map(|b| b.trim())
            .filter(|b| !b.is_empty())
            .collect();
        if brokers.is_empty() {
            return Err(KafkaSetupError::NoBrokers);
        }

        let producer: FutureProducer = config.client_config().create()?;
        let brokers = brokers.join(",");
        info!(brokers = %brokers, "kafka producer created");

        Ok(Self {
            producer,
            brokers,
            publish_timeout: config.publish_timeout,
        })
    }

    /// Wait for in-flight messages to be delivered.
    pub fn flush(&self, timeout: Duration) -> Result<(), PublishError> {
        self.producer
            .flush(Timeout::After(timeout))
            .map_err(|e| classify_delivery_error(&e, timeout))
    }
}

#[async_trait]
impl EventPublisher for KafkaPublisher {
    async fn publish(&self, topic: &str, key: &str, value: Vec<u8>) -> Result<(), PublishError> {
        let record = FutureRecord::to(topic).key(key).payload(&value);
        let delivery = self
            .producer
            .send(record, Timeout::After(self.publish_timeout));

        match tokio::time::timeout(self.publish_timeout, delivery).await {
            Ok(Ok(_)) => {
                debug!(topic, key, size = value.len(), "message acknowledged");
                Ok(())
            }
            Ok(Err((err, _message))) => {
                warn!(topic, key, error = %err, "message delivery failed");
                Err(classify_delivery_error(&err, self.publish_timeout))
            }
            Err(_) => Err(PublishError::Timeout(self.publish_timeout)),
        }
    }
}

/// librdkafka reads `0` as "no timeout", so the value is at least 1 ms.
fn message_timeout_ms(timeout: Duration) -> String {
    timeout.as_millis().clamp(1, u128::from(i32::MAX.unsigned_abs())).to_string()
}

fn classify_delivery_error(err: &KafkaError, timeout: Duration) -> PublishError {
    match err.rdkafka_error_code() {
        Some(RDKafkaErrorCode::MessageTimedOut | RDKafkaErrorCode::OperationTimedOut) => {
            PublishError::Timeout(timeout)
        }
        _ => PublishError::Failed(err.to_string()),
    }
}
