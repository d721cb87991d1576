//! In-memory implementations of the storage and publishing ports.
//!
//! Used by tests across the workspace and handy for local runs without MinIO
//! or Kafka. Both record every call and can be told to fail.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::{PublishError, StorageError};
use crate::ports::{EventPublisher, ObjectStore};

/// Object store backed by a concurrent map.
///
/// ```
/// use bytes::Bytes;
/// use ondc_edge_core::memory::MemoryObjectStore;
/// use ondc_edge_core::ports::ObjectStore;
///
/// # tokio_test::block_on(async {
/// let store = MemoryObjectStore::new("ondc-payloads");
/// store
///     .upload("ondc/ONDC_RET11/on_search/a.json", Bytes::from("{}"), "application/json")
///     .await
///     .unwrap();
///
/// let data = store.fetch("ondc/ONDC_RET11/on_search/a.json").await.unwrap();
/// assert_eq!(data.as_ref(), b"{}");
/// assert_eq!(store.upload_calls().len(), 1);
/// # });
/// ```
#[derive(Debug)]
pub struct MemoryObjectStore {
    bucket: String,
    kind: String,
    objects: DashMap<String, Bytes>,
    uploads: Mutex<Vec<String>>,
    failure: Mutex<Option<StorageError>>,
    delay: Mutex<Option<Duration>>,
}

impl MemoryObjectStore {
    /// Create an empty store for `bucket`, reporting storage kind `memory`.
    #[must_use]
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            kind: "memory".to_owned(),
            objects: DashMap::new(),
            uploads: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            delay: Mutex::new(None),
        }
    }

    /// Override the reported storage kind.
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Make every following upload fail with `err`.
    pub fn fail_with(&self, err: StorageError) {
        *self.failure.lock() = Some(err);
    }

    /// Delay every following upload by `delay`.
    pub fn delay_uploads(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Keys of all upload attempts, in call order.
    #[must_use]
    pub fn upload_calls(&self) -> Vec<String> {
        self.uploads.lock().clone()
    }

    /// Number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        key: &str,
        payload: Bytes,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        self.uploads.lock().push(key.to_owned());

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.failure.lock().clone() {
            return Err(err);
        }

        self.objects.insert(key.to_owned(), payload);
        Ok(key.to_owned())
    }

    async fn fetch(&self, key: &str) -> Result<Bytes, StorageError> {
        self.objects
            .get(key)
            .map(|v| v.value().clone())
            .ok_or_else(|| StorageError::NotFound(key.to_owned()))
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn kind(&self) -> &str {
        &self.kind
    }
}

/// A message captured by [`RecordingPublisher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    /// Destination topic.
    pub topic: String,
    /// Message key.
    pub key: String,
    /// Message value.
    pub value: Vec<u8>,
}

/// Publisher that keeps every acknowledged message in memory.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<PublishedMessage>>,
    attempts: Mutex<usize>,
    failure: Mutex<Option<PublishError>>,
    delay: Mutex<Option<Duration>>,
}

impl RecordingPublisher {
    /// Create a publisher that acknowledges everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following publish fail with `err`.
    pub fn fail_with(&self, err: PublishError) {
        *self.failure.lock() = Some(err);
    }

    /// Delay every following publish by `delay`.
    pub fn delay_publishes(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Acknowledged messages, in call order.
    #[must_use]
    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.messages.lock().clone()
    }

    /// Number of publish calls, including failed ones.
    #[must_use]
    pub fn attempts(&self) -> usize {
        *self.attempts.lock()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, key: &str, value: Vec<u8>) -> Result<(), PublishError> {
        *self.attempts.lock() += 1;

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.failure.lock().clone() {
            return Err(err);
        }

        self.messages.lock().push(PublishedMessage {
            topic: topic.to_owned(),
            key: key.to_owned(),
            value,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_should_store_and_fetch_object() {
        let store = MemoryObjectStore::new("bucket");
        let key = store
            .upload("a/b.json", Bytes::from_static(b"{}"), "application/json")
            .await
            .unwrap();
        assert_eq!(key, "a/b.json");
        assert_eq!(store.fetch("a/b.json").await.unwrap(), Bytes::from_static(b"{}"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_should_return_not_found_for_missing_object() {
        let store = MemoryObjectStore::new("bucket");
        assert!(matches!(
            store.fetch("nope").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_should_record_failed_upload_attempt() {
        let store = MemoryObjectStore::new("bucket");
        store.fail_with(StorageError::Unavailable("connection refused".into()));
        let err = store
            .upload("k", Bytes::new(), "application/json")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
        assert_eq!(store.upload_calls(), vec!["k".to_owned()]);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_should_record_published_messages() {
        let publisher = RecordingPublisher::new();
        publisher.publish("topic", "key", b"v".to_vec()).await.unwrap();
        publisher.fail_with(PublishError::Failed("broker down".into()));
        assert!(publisher.publish("topic", "key", b"w".to_vec()).await.is_err());

        assert_eq!(publisher.attempts(), 2);
        assert_eq!(
            publisher.messages(),
            vec![PublishedMessage {
                topic: "topic".into(),
                key: "key".into(),
                value: b"v".to_vec(),
            }]
        );
    }
}
