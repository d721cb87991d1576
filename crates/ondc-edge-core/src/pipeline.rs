//! The ingestion orchestrator.
//!
//! [`IngestionOrchestrator::ingest`] runs one payload through
//!
//! ```text
//! Received -> ContextExtracted -> Validated -> Stored -> Published -> Done
//! ```
//!
//! and maps any failure into an [`IngestError`] tagged with the stage that was
//! in flight. Storage and publish are each bounded by their own timeout, capped
//! by the caller's request deadline. A panic inside the pipeline is caught here
//! and reported as [`ErrorKind::UnexpectedInternalFault`].
//!
//! A payload whose pointer cannot be published stays in the object store; the
//! orphaned key is logged at error level and no rollback is attempted.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use futures::FutureExt;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use typed_builder::TypedBuilder;

use crate::config::EdgeConfig;
use crate::context::IngestionContext;
use crate::error::{ErrorKind, IngestError, PipelineStage, PublishError, StorageError};
use crate::object_key::ObjectKeyScheme;
use crate::pointer::PointerEvent;
use crate::ports::{EventPublisher, ObjectStore, SchemaValidator};

/// Content type recorded on stored payloads.
pub const PAYLOAD_CONTENT_TYPE: &str = "application/json";

/// Progress of one ingestion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IngestState {
    /// Payload accepted for processing.
    Received = 0,
    /// Routing fields read.
    ContextExtracted = 1,
    /// Schema validation passed.
    Validated = 2,
    /// Payload written to the object store.
    Stored = 3,
    /// Pointer acknowledged by the broker.
    Published = 4,
    /// Receipt returned.
    Done = 5,
}

impl IngestState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Received,
            1 => Self::ContextExtracted,
            2 => Self::Validated,
            3 => Self::Stored,
            4 => Self::Published,
            _ => Self::Done,
        }
    }

    /// Stage that runs while the call sits in this state.
    #[must_use]
    pub fn stage_in_flight(self) -> PipelineStage {
        match self {
            Self::Received => PipelineStage::ContextExtraction,
            Self::ContextExtracted => PipelineStage::Validation,
            Self::Validated => PipelineStage::Storage,
            Self::Stored | Self::Published | Self::Done => PipelineStage::Publish,
        }
    }
}

/// Records the current state so a caught panic can name its stage.
#[derive(Debug, Default)]
struct StateTracker(AtomicU8);

impl StateTracker {
    fn advance(&self, state: IngestState) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn current(&self) -> IngestState {
        IngestState::from_u8(self.0.load(Ordering::Acquire))
    }
}

/// Tunables for the orchestrator.
#[derive(Debug, Clone, TypedBuilder)]
pub struct PipelineSettings {
    /// Topic receiving pointer events.
    #[builder(default = String::from("ondc.on_search.pointer"), setter(into))]
    pub topic: String,

    /// Upper bound on one upload.
    #[builder(default = Duration::from_secs(10))]
    pub storage_timeout: Duration,

    /// Upper bound on one publish.
    #[builder(default = Duration::from_secs(10))]
    pub publish_timeout: Duration,

    /// Object key generator.
    #[builder(default)]
    pub key_scheme: ObjectKeyScheme,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl PipelineSettings {
    /// Derive settings from the service configuration.
    #[must_use]
    pub fn from_config(config: &EdgeConfig) -> Self {
        Self {
            topic: config.kafka_on_search_topic.clone(),
            storage_timeout: config.storage_timeout(),
            publish_timeout: config.publish_timeout(),
            key_scheme: ObjectKeyScheme::new(&config.object_key_timezone),
        }
    }
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReceipt {
    /// Bucket holding the payload.
    pub bucket: String,
    /// Key the payload was stored under.
    pub object_key: String,
    /// Payload transaction id.
    pub transaction_id: String,
    /// Payload message id.
    pub message_id: String,
    /// Payload domain.
    pub domain: String,
    /// Payload action.
    pub action: String,
}

/// Sequences extraction, validation, storage and publish for each payload.
///
/// Cheap to clone; all collaborators are shared.
#[derive(Debug, Clone)]
pub struct IngestionOrchestrator {
    validator: Arc<dyn SchemaValidator>,
    store: Arc<dyn ObjectStore>,
    publisher: Arc<dyn EventPublisher>,
    settings: Arc<PipelineSettings>,
}

impl IngestionOrchestrator {
    /// Wire an orchestrator from its collaborators.
    #[must_use]
    pub fn new(
        validator: Arc<dyn SchemaValidator>,
        store: Arc<dyn ObjectStore>,
        publisher: Arc<dyn EventPublisher>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            validator,
            store,
            publisher,
            settings: Arc::new(settings),
        }
    }

    /// Active settings.
    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run one payload through the pipeline.
    ///
    /// `deadline` caps the storage and publish steps in addition to their own
    /// timeouts.
    pub async fn ingest(
        &self,
        payload: Bytes,
        deadline: Instant,
    ) -> Result<IngestReceipt, IngestError> {
        let tracker = StateTracker::default();

        match AssertUnwindSafe(self.run(payload, deadline, &tracker))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let stage = tracker.current().stage_in_flight();
                let detail = panic_message(panic.as_ref());
                error!(stage = %stage, panic = %detail, "ingestion pipeline panicked");
                Err(IngestError::new(
                    stage,
                    ErrorKind::UnexpectedInternalFault,
                    "unexpected internal fault",
                )
                .with_details(detail))
            }
        }
    }

    async fn run(
        &self,
        payload: Bytes,
        deadline: Instant,
        tracker: &StateTracker,
    ) -> Result<IngestReceipt, IngestError> {
        tracker.advance(IngestState::Received);
        if payload.is_empty() {
            return Err(IngestError::new(
                PipelineStage::Received,
                ErrorKind::EmptyPayload,
                "empty payload",
            ));
        }

        let ctx = IngestionContext::extract(&payload).map_err(|e| {
            IngestError::new(PipelineStage::ContextExtraction, e.kind(), e.to_string())
        })?;
        tracker.advance(IngestState::ContextExtracted);
        debug!(
            domain = ctx.domain(),
            action = ctx.action(),
            transaction_id = ctx.transaction_id(),
            message_id = ctx.message_id(),
            size = payload.len(),
            "context extracted"
        );

        self.validator
            .validate(ctx.domain(), ctx.action(), &payload)
            .map_err(|e| {
                IngestError::new(PipelineStage::Validation, e.kind(), "payload failed validation")
                    .with_details(e.to_string())
            })?;
        tracker.advance(IngestState::Validated);

        let object_key = self.store_payload(&ctx, payload, deadline).await?;
        tracker.advance(IngestState::Stored);

        self.publish_pointer(&ctx, &object_key, deadline).await?;
        tracker.advance(IngestState::Published);

        info!(
            transaction_id = ctx.transaction_id(),
            message_id = ctx.message_id(),
            object_key = %object_key,
            "payload ingested"
        );
        tracker.advance(IngestState::Done);

        Ok(IngestReceipt {
            bucket: self.store.bucket().to_owned(),
            object_key,
            transaction_id: ctx.transaction_id().to_owned(),
            message_id: ctx.message_id().to_owned(),
            domain: ctx.domain().to_owned(),
            action: ctx.action().to_owned(),
        })
    }

    async fn store_payload(
        &self,
        ctx: &IngestionContext,
        payload: Bytes,
        deadline: Instant,
    ) -> Result<String, IngestError> {
        let key = self.settings.key_scheme.generate(ctx, Utc::now());
        let (step_deadline, budget) = step_deadline(deadline, self.settings.storage_timeout);

        let upload = self.store.upload(&key, payload, PAYLOAD_CONTENT_TYPE);
        let result = match tokio::time::timeout_at(step_deadline, upload).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout(budget)),
        };

        result.map_err(|e| {
            warn!(
                transaction_id = ctx.transaction_id(),
                object_key = %key,
                error = %e,
                "payload upload failed"
            );
            IngestError::new(PipelineStage::Storage, e.kind(), "failed to persist payload")
                .with_details(e.to_string())
        })
    }

    async fn publish_pointer(
        &self,
        ctx: &IngestionContext,
        object_key: &str,
        deadline: Instant,
    ) -> Result<(), IngestError> {
        let event = PointerEvent::new(self.store.kind(), self.store.bucket(), object_key, ctx);
        let value = event.to_json().map_err(|e| {
            IngestError::new(
                PipelineStage::Publish,
                ErrorKind::SerializationFailed,
                "failed to serialize pointer event",
            )
            .with_details(e.to_string())
        })?;

        let (step_deadline, budget) = step_deadline(deadline, self.settings.publish_timeout);
        let publish = self
            .publisher
            .publish(&self.settings.topic, ctx.transaction_id(), value);
        let result = match tokio::time::timeout_at(step_deadline, publish).await {
            Ok(result) => result,
            Err(_) => Err(PublishError::Timeout(budget)),
        };

        result.map_err(|e| {
            error!(
                transaction_id = ctx.transaction_id(),
                bucket = self.store.bucket(),
                object_key,
                topic = %self.settings.topic,
                error = %e,
                "pointer publish failed, stored payload is orphaned"
            );
            IngestError::new(PipelineStage::Publish, e.kind(), "failed to publish pointer event")
                .with_details(e.to_string())
        })
    }
}

/// Earlier of the request deadline and `now + limit`, plus the time left until it.
///
/// A `limit` too large to add to `now` leaves the request deadline in charge.
fn step_deadline(deadline: Instant, limit: Duration) -> (Instant, Duration) {
    let now = Instant::now();
    let step = now
        .checked_add(limit)
        .map_or(deadline, |t| deadline.min(t));
    (step, step.saturating_duration_since(now))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
