//! Error taxonomy for the ingestion pipeline.
//!
//! Each collaborator reports failures with its own error enum
//! ([`ValidationError`], [`StorageError`], [`PublishError`], [`ContextError`]).
//! The orchestrator folds them into a single [`IngestError`] that records the
//! [`PipelineStage`] that failed and a stable [`ErrorKind`]. The kind carries the
//! machine-readable code and the HTTP status used by the inbound layer.
//!
//! # Usage
//!
//! ```
//! use ondc_edge_core::error::{ErrorKind, IngestError, PipelineStage};
//!
//! let err = IngestError::new(PipelineStage::Received, ErrorKind::EmptyPayload, "empty body");
//! assert_eq!(err.kind.code(), "EMPTY_PAYLOAD");
//! assert!(err.kind.is_client_fault());
//! ```

use std::fmt;
use std::time::Duration;

use http::StatusCode;

/// Stable classification of every way an ingestion call can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request body was empty.
    EmptyPayload,
    /// The `context` envelope or one of its routing fields is absent or empty.
    MissingRequiredField,
    /// The payload is not well-formed JSON.
    MalformedPayload,
    /// The payload does not satisfy the schema registered for its domain/action.
    SchemaViolation,
    /// No schema is registered for the payload's domain/action.
    UnknownSchema,
    /// The object store could not be reached or rejected our credentials.
    StorageUnavailable,
    /// The object store accepted the connection but the write failed.
    StorageWriteFailed,
    /// The upload did not complete before its deadline.
    StorageTimeout,
    /// The broker did not acknowledge the pointer before its deadline.
    PublishTimeout,
    /// The broker rejected the pointer.
    PublishFailed,
    /// The pointer event could not be serialized.
    SerializationFailed,
    /// A panic or other unexpected fault inside the pipeline.
    UnexpectedInternalFault,
}

impl ErrorKind {
    /// Machine-readable code returned to callers.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::EmptyPayload => "EMPTY_PAYLOAD",
            Self::MissingRequiredField => "MISSING_REQUIRED_FIELD",
            Self::MalformedPayload => "MALFORMED_PAYLOAD",
            Self::SchemaViolation => "SCHEMA_VIOLATION",
            Self::UnknownSchema => "UNKNOWN_SCHEMA",
            Self::StorageUnavailable => "STORAGE_UNAVAILABLE",
            Self::StorageWriteFailed => "STORAGE_WRITE_FAILED",
            Self::StorageTimeout => "STORAGE_TIMEOUT",
            Self::PublishTimeout => "PUBLISH_TIMEOUT",
            Self::PublishFailed => "PUBLISH_FAILED",
            Self::SerializationFailed => "SERIALIZATION_FAILED",
            Self::UnexpectedInternalFault => "INTERNAL_FAULT",
        }
    }

    /// HTTP status the inbound layer answers with.
    #[must_use]
    pub fn status_code(self) -> StatusCode {
        match self {
            Self::EmptyPayload
            | Self::MissingRequiredField
            | Self::MalformedPayload
            | Self::SchemaViolation
            | Self::UnknownSchema => StatusCode::BAD_REQUEST,
            Self::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::StorageTimeout | Self::PublishTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::PublishFailed => StatusCode::BAD_GATEWAY,
            Self::StorageWriteFailed | Self::SerializationFailed | Self::UnexpectedInternalFault => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether the failure is the caller's fault (4xx class).
    #[must_use]
    pub fn is_client_fault(self) -> bool {
        self.status_code().is_client_error()
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Pipeline stage in which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    /// Before any processing: the raw payload itself was rejected.
    Received,
    /// Reading the routing fields from the `context` envelope.
    ContextExtraction,
    /// Schema validation.
    Validation,
    /// Upload to the object store.
    Storage,
    /// Pointer construction and publication.
    Publish,
}

impl PipelineStage {
    /// Lower-case stage name used in logs and error bodies.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::ContextExtraction => "context_extraction",
            Self::Validation => "validation",
            Self::Storage => "storage",
            Self::Publish => "publish",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of one ingestion call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("[{kind}] {message} (stage: {stage})")]
pub struct IngestError {
    /// Stage that was in flight when the call failed.
    pub stage: PipelineStage,
    /// Stable failure classification.
    pub kind: ErrorKind,
    /// Human-readable summary.
    pub message: String,
    /// Underlying cause, e.g. the schema diff or the storage client error.
    pub details: Option<String>,
}

impl IngestError {
    /// Create an error without details.
    #[must_use]
    pub fn new(stage: PipelineStage, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Failure reading the routing fields from the payload envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// The top-level `context` object is absent or not an object.
    #[error("missing 'context' object in payload")]
    MissingContext,

    /// A routing field is absent, not a string, or empty.
    #[error("missing or empty required field 'context.{0}'")]
    MissingField(&'static str),

    /// The bytes are not a JSON document.
    #[error("failed to parse payload: {0}")]
    Malformed(String),
}

impl ContextError {
    /// Map to the stable error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingContext | Self::MissingField(_) => ErrorKind::MissingRequiredField,
            Self::Malformed(_) => ErrorKind::MalformedPayload,
        }
    }
}

/// Failure reported by a schema validator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// No schema is registered for the pair.
    #[error("no schema found for domain={domain}, action={action}")]
    UnknownSchema {
        /// Payload domain.
        domain: String,
        /// Payload action.
        action: String,
    },

    /// The payload is not well-formed JSON.
    #[error("invalid JSON payload: {0}")]
    MalformedPayload(String),

    /// The payload violates the schema.
    #[error("validation failed for {schema_key}: {}", .violations.join("; "))]
    SchemaViolation {
        /// `domain:action` key of the schema that rejected the payload.
        schema_key: String,
        /// One entry per violation, `"<message> at <instance path>"`.
        violations: Vec<String>,
    },
}

impl ValidationError {
    /// Map to the stable error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownSchema { .. } => ErrorKind::UnknownSchema,
            Self::MalformedPayload(_) => ErrorKind::MalformedPayload,
            Self::SchemaViolation { .. } => ErrorKind::SchemaViolation,
        }
    }
}

/// Failure reported by an object store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Connection, DNS, TLS or credential failure.
    #[error("object storage unavailable: {0}")]
    Unavailable(String),

    /// Any other write failure (quota, bad bucket, server error).
    #[error("failed to upload object: {0}")]
    WriteFailed(String),

    /// The call exceeded its deadline.
    #[error("object storage call timed out after {0:?}")]
    Timeout(Duration),

    /// The requested object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),
}

impl StorageError {
    /// Map to the stable error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable(_) => ErrorKind::StorageUnavailable,
            Self::Timeout(_) => ErrorKind::StorageTimeout,
            Self::WriteFailed(_) | Self::NotFound(_) => ErrorKind::StorageWriteFailed,
        }
    }
}

/// Failure reported by an event publisher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    /// The broker did not acknowledge in time.
    #[error("publish timed out after {0:?}")]
    Timeout(Duration),

    /// The broker or client rejected the message.
    #[error("failed to publish message: {0}")]
    Failed(String),
}

impl PublishError {
    /// Map to the stable error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout(_) => ErrorKind::PublishTimeout,
            Self::Failed(_) => ErrorKind::PublishFailed,
        }
    }
}
