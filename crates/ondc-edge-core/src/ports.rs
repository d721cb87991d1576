//! Collaborator traits the orchestrator depends on.
//!
//! Implementations live in their own crates (`ondc-edge-schema`,
//! `ondc-edge-storage`, `ondc-edge-kafka`); in-memory doubles live in
//! [`crate::memory`].

use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{PublishError, StorageError, ValidationError};

/// Validates a payload against the schema registered for its domain/action.
pub trait SchemaValidator: Debug + Send + Sync {
    /// Validate `payload`. The schema lookup must not depend on payload content.
    fn validate(&self, domain: &str, action: &str, payload: &[u8]) -> Result<(), ValidationError>;
}

/// Durable object storage.
#[async_trait]
pub trait ObjectStore: Debug + Send + Sync {
    /// Store `payload` under `key` and return the key actually used.
    async fn upload(
        &self,
        key: &str,
        payload: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Read an object back.
    async fn fetch(&self, key: &str) -> Result<Bytes, StorageError>;

    /// Bucket objects are written to.
    fn bucket(&self) -> &str;

    /// Storage kind recorded in pointer events.
    fn kind(&self) -> &str;
}

/// Acknowledged delivery of keyed messages.
#[async_trait]
pub trait EventPublisher: Debug + Send + Sync {
    /// Publish `value` to `topic` under `key`, returning once the broker acknowledged it.
    async fn publish(&self, topic: &str, key: &str, value: Vec<u8>) -> Result<(), PublishError>;
}
