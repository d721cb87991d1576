//! S3/MinIO object store adapter.
//!
//! [`S3ObjectStore`] implements the core [`ObjectStore`](ondc_edge_core::ports::ObjectStore)
//! port on top of `aws-sdk-s3` with static credentials, a custom endpoint and
//! path-style addressing, which is what MinIO expects. Calls are not retried.
//!
//! Failures are classified for the pipeline: transport errors, timeouts and
//! credential rejections become [`StorageError::Unavailable`](ondc_edge_core::error::StorageError::Unavailable),
//! everything else becomes `WriteFailed`.

pub mod config;
pub mod store;

pub use config::S3StorageConfig;
pub use store::S3ObjectStore;
