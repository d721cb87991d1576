//! Kafka publisher for pointer events.
//!
//! [`KafkaPublisher`] implements the core
//! [`EventPublisher`](ondc_edge_core::ports::EventPublisher) port with an
//! `rdkafka` [`FutureProducer`](rdkafka::producer::FutureProducer) configured
//! for `acks=all`. Each publish waits for the broker acknowledgement, bounded by
//! the configured publish timeout.

pub mod publisher;

pub use publisher::{KafkaPublisher, KafkaPublisherConfig, KafkaSetupError};
