//! Object store connection settings.

use std::fmt;
use std::time::Duration;

use ondc_edge_core::config::EdgeConfig;
use typed_builder::TypedBuilder;

/// Settings for [`S3ObjectStore`](crate::S3ObjectStore).
///
/// # Examples
///
/// ```
/// use ondc_edge_storage::S3StorageConfig;
///
/// let config = S3StorageConfig::builder()
///     .endpoint("localhost:9000")
///     .access_key("minio")
///     .secret_key("minio123")
///     .build();
/// assert_eq!(config.endpoint_url(), "http://localhost:9000");
/// ```
#[derive(Clone, TypedBuilder)]
pub struct S3StorageConfig {
    /// `host:port`, or a full URL with scheme.
    #[builder(setter(into))]
    pub endpoint: String,

    /// Static access key.
    #[builder(setter(into))]
    pub access_key: String,

    /// Static secret key.
    #[builder(setter(into))]
    pub secret_key: String,

    /// Use `https` when the endpoint carries no scheme.
    #[builder(default = false)]
    pub use_ssl: bool,

    /// Bucket receiving payloads; created at connect time if missing.
    #[builder(default = String::from("ondc-payloads"), setter(into))]
    pub bucket: String,

    /// Signing region.
    #[builder(default = String::from("us-east-1"), setter(into))]
    pub region: String,

    /// Storage kind recorded in pointer events.
    #[builder(default = String::from("minio"), setter(into))]
    pub kind: String,

    /// Upper bound on the bucket check performed by `connect`.
    #[builder(default = Duration::from_secs(10))]
    pub connect_timeout: Duration,
}

impl fmt::Debug for S3StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("use_ssl", &self.use_ssl)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("kind", &self.kind)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl S3StorageConfig {
    /// Take the `MINIO_*` and `STORAGE_KIND` settings from the service configuration.
    #[must_use]
    pub fn from_config(config: &EdgeConfig) -> Self {
        Self::builder()
            .endpoint(config.minio_endpoint.clone())
            .access_key(config.minio_access_key.clone())
            .secret_key(config.minio_secret_key.clone())
            .use_ssl(config.minio_use_ssl)
            .bucket(config.minio_bucket.clone())
            .region(config.minio_region.clone())
            .kind(config.storage_kind.clone())
            .build()
    }

    /// Endpoint as a URL the S3 client accepts.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://") {
            return self.endpoint.clone();
        }
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{scheme}://{}", self.endpoint)
    }
}
