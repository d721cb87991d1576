//! JSON Schema registry for ONDC payloads.
//!
//! [`SchemaRegistry`] compiles one schema per `(domain, action)` pair at
//! startup and validates raw payloads against them. The registry built by
//! [`SchemaRegistry::embedded`] covers `ONDC:RET11/on_search` and
//! `ONDC:RET18/search`.

pub mod registry;

pub use registry::{SchemaCompileError, SchemaRegistry, SchemaSource};
