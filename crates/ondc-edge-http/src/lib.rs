//! HTTP front end for the ONDC edge adapter.
//!
//! [`EdgeHttpService`] is a hyper [`Service`](hyper::service::Service) that
//! accepts `POST /on-search`, runs the body through the ingestion pipeline and
//! answers `202 Accepted` or a JSON error carrying the failure code and stage.
//! It also serves health probes and CORS preflights.

pub mod response;
pub mod service;

pub use response::{EdgeResponseBody, error_to_response};
pub use service::{EdgeHttpConfig, EdgeHttpService, INGEST_PATH};
