//! Service configuration.
//!
//! Provides [`EdgeConfig`], loaded once at startup from environment variables
//! via [`EdgeConfig::from_env`]. Variables without a default are required and
//! surface as [`ConfigError::Missing`] when absent or empty.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Upper bound for every `*_TIMEOUT_SECS` setting.
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// Errors raised while reading configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    /// A variable is set but cannot be parsed.
    #[error("invalid value {value:?} for {name}: {reason}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Raw value.
        value: String,
        /// Parse failure.
        reason: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Edge adapter configuration.
///
/// # Examples
///
/// ```
/// use ondc_edge_core::config::EdgeConfig;
///
/// let config = EdgeConfig::builder()
///     .minio_endpoint("localhost:9000".into())
///     .minio_access_key("minio".into())
///     .minio_secret_key("minio123".into())
///     .kafka_brokers(vec!["localhost:9092".into()])
///     .build();
/// assert_eq!(config.listen_addr, "0.0.0.0:8080");
/// assert_eq!(config.minio_bucket, "ondc-payloads");
/// ```
#[derive(Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct EdgeConfig {
    /// Bind address for the HTTP server.
    #[builder(default = String::from("0.0.0.0:8080"))]
    pub listen_addr: String,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,

    /// Log output format.
    #[builder(default)]
    pub log_format: LogFormat,

    /// `host:port` of the S3-compatible endpoint.
    pub minio_endpoint: String,

    /// Access key for the object store.
    pub minio_access_key: String,

    /// Secret key for the object store.
    #[serde(skip_serializing)]
    pub minio_secret_key: String,

    /// Whether the object store is reached over TLS.
    #[builder(default = false)]
    pub minio_use_ssl: bool,

    /// Bucket receiving raw payloads.
    #[builder(default = String::from("ondc-payloads"))]
    pub minio_bucket: String,

    /// Region passed to the S3 client.
    #[builder(default = String::from("us-east-1"))]
    pub minio_region: String,

    /// Storage kind recorded in pointer events.
    #[builder(default = String::from("minio"))]
    pub storage_kind: String,

    /// Kafka bootstrap brokers.
    pub kafka_brokers: Vec<String>,

    /// Topic receiving `on_search` pointer events.
    #[builder(default = String::from("ondc.on_search.pointer"))]
    pub kafka_on_search_topic: String,

    /// Upper bound on one publish call, in seconds.
    #[builder(default = 10)]
    pub kafka_publish_timeout_secs: u64,

    /// Upper bound on one upload, in seconds.
    #[builder(default = 10)]
    pub storage_timeout_secs: u64,

    /// Upper bound on one whole request, in seconds.
    #[builder(default = 30)]
    pub request_timeout_secs: u64,

    /// Largest accepted request body.
    #[builder(default = 4 * 1024 * 1024)]
    pub max_body_bytes: usize,

    /// IANA timezone used for the date segment of object keys.
    #[builder(default = String::from("Asia/Kolkata"))]
    pub object_key_timezone: String,
}

impl fmt::Debug for EdgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeConfig")
            .field("listen_addr", &self.listen_addr)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("minio_endpoint", &self.minio_endpoint)
            .field("minio_access_key", &self.minio_access_key)
            .field("minio_secret_key", &"<redacted>")
            .field("minio_use_ssl", &self.minio_use_ssl)
            .field("minio_bucket", &self.minio_bucket)
            .field("minio_region", &self.minio_region)
            .field("storage_kind", &self.storage_kind)
            .field("kafka_brokers", &self.kafka_brokers)
            .field("kafka_on_search_topic", &self.kafka_on_search_topic)
            .field("kafka_publish_timeout_secs", &self.kafka_publish_timeout_secs)
            .field("storage_timeout_secs", &self.storage_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("object_key_timezone", &self.object_key_timezone)
            .finish()
    }
}

impl EdgeConfig {
    /// Load configuration from the process environment.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `PORT` | `8080` |
    /// | `LISTEN_ADDR` | `0.0.0.0:$PORT` |
    /// | `LOG_LEVEL` | `info` |
    /// | `LOG_FORMAT` | `text` |
    /// | `MINIO_ENDPOINT` | required |
    /// | `MINIO_ACCESS_KEY` | required |
    /// | `MINIO_SECRET_KEY` | required |
    /// | `MINIO_USE_SSL` | `false` |
    /// | `MINIO_BUCKET` | `ondc-payloads` |
    /// | `MINIO_REGION` | `us-east-1` |
    /// | `STORAGE_KIND` | `minio` |
    /// | `KAFKA_BROKERS` | required, comma-separated |
    /// | `KAFKA_ON_SEARCH_TOPIC` | `ondc.on_search.pointer` |
    /// | `KAFKA_PUBLISH_TIMEOUT_SECS` | `10` |
    /// | `STORAGE_TIMEOUT_SECS` | `10` |
    /// | `REQUEST_TIMEOUT_SECS` | `30` |
    /// | `MAX_BODY_BYTES` | `4194304` |
    /// | `OBJECT_KEY_TIMEZONE` | `Asia/Kolkata` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let listen_addr = match get("LISTEN_ADDR") {
            Some(addr) => addr,
            None => {
                let port: u16 = parse_or("PORT", get("PORT"), 8080)?;
                format!("0.0.0.0:{port}")
            }
        };

        let log_format = match get("LOG_FORMAT") {
            None => LogFormat::Text,
            Some(v) if v.eq_ignore_ascii_case("text") => LogFormat::Text,
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            Some(v) => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    value: v,
                    reason: "expected \"text\" or \"json\"".into(),
                });
            }
        };

        let kafka_brokers: Vec<String> = required("KAFKA_BROKERS")?
            .split(',')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(String::from)
            .collect();
        if kafka_brokers.is_empty() {
            return Err(ConfigError::Missing("KAFKA_BROKERS"));
        }

        Ok(Self {
            listen_addr,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".into()),
            log_format,
            minio_endpoint: required("MINIO_ENDPOINT")?,
            minio_access_key: required("MINIO_ACCESS_KEY")?,
            minio_secret_key: required("MINIO_SECRET_KEY")?,
            minio_use_ssl: get("MINIO_USE_SSL").is_some_and(|v| parse_bool(&v)),
            minio_bucket: get("MINIO_BUCKET").unwrap_or_else(|| "ondc-payloads".into()),
            minio_region: get("MINIO_REGION").unwrap_or_else(|| "us-east-1".into()),
            storage_kind: get("STORAGE_KIND").unwrap_or_else(|| "minio".into()),
            kafka_brokers,
            kafka_on_search_topic: get("KAFKA_ON_SEARCH_TOPIC")
                .unwrap_or_else(|| "ondc.on_search.pointer".into()),
            kafka_publish_timeout_secs: parse_timeout_secs(
                "KAFKA_PUBLISH_TIMEOUT_SECS",
                get("KAFKA_PUBLISH_TIMEOUT_SECS"),
                10,
            )?,
            storage_timeout_secs: parse_timeout_secs(
                "STORAGE_TIMEOUT_SECS",
                get("STORAGE_TIMEOUT_SECS"),
                10,
            )?,
            request_timeout_secs: parse_timeout_secs(
                "REQUEST_TIMEOUT_SECS",
                get("REQUEST_TIMEOUT_SECS"),
                30,
            )?,
            max_body_bytes: parse_or("MAX_BODY_BYTES", get("MAX_BODY_BYTES"), 4 * 1024 * 1024)?,
            object_key_timezone: get("OBJECT_KEY_TIMEZONE")
                .unwrap_or_else(|| "Asia/Kolkata".into()),
        })
    }

    /// Publish timeout as a [`Duration`].
    #[must_use]
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.kafka_publish_timeout_secs)
    }

    /// Storage timeout as a [`Duration`].
    #[must_use]
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_secs)
    }

    /// Whole-request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_or<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match value {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value: v,
        }),
    }
}

/// Timeouts are whole seconds in `1..=MAX_TIMEOUT_SECS`.
fn parse_timeout_secs(
    name: &'static str,
    value: Option<String>,
    default: u64,
) -> Result<u64, ConfigError> {
    let secs = parse_or(name, value, default)?;
    if (1..=MAX_TIMEOUT_SECS).contains(&secs) {
        Ok(secs)
    } else {
        Err(ConfigError::Invalid {
            name,
            value: secs.to_string(),
            reason: format!("expected 1..={MAX_TIMEOUT_SECS} seconds"),
        })
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
