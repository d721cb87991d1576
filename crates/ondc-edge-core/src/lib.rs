//! Core of the ONDC edge ingestion adapter.
//!
//! This crate holds everything between the HTTP layer and the outside world:
//!
//! - [`context`]: streaming extraction of the payload's routing fields.
//! - [`pipeline`]: the [`IngestionOrchestrator`] that validates, stores and
//!   publishes each payload.
//! - [`ports`]: the validator, object store and publisher traits it drives.
//! - [`object_key`] and [`pointer`]: storage keys and the published pointer event.
//! - [`error`]: the error taxonomy shared by every crate in the workspace.
//! - [`config`]: environment-driven service configuration.
//! - [`memory`]: in-memory store and publisher for tests and local runs.

pub mod config;
pub mod context;
pub mod error;
pub mod memory;
pub mod object_key;
pub mod pipeline;
pub mod pointer;
pub mod ports;

pub use config::{ConfigError, EdgeConfig, LogFormat};
pub use context::IngestionContext;
pub use error::{
    ContextError, ErrorKind, IngestError, PipelineStage, PublishError, StorageError,
    ValidationError,
};
pub use object_key::ObjectKeyScheme;
pub use pipeline::{IngestReceipt, IngestState, IngestionOrchestrator, PipelineSettings};
pub use pointer::PointerEvent;
pub use ports::{EventPublisher, ObjectStore, SchemaValidator};
