//! S3-compatible implementation of [`ObjectStore`].

use std::fmt;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use ondc_edge_core::error::StorageError;
use ondc_edge_core::ports::ObjectStore;
use tracing::{debug, info};

use crate::config::S3StorageConfig;

/// Error codes meaning the store rejected our identity.
const AUTH_ERROR_CODES: &[&str] = &[
    "AccessDenied",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "ExpiredToken",
    "InvalidToken",
];

/// Error codes meaning the bucket is already there.
const BUCKET_EXISTS_CODES: &[&str] = &["BucketAlreadyOwnedByYou", "BucketAlreadyExists"];

/// Object store backed by an S3-compatible service such as MinIO.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    kind: String,
    endpoint: String,
}

impl fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl S3ObjectStore {
    /// Build a client and make sure the bucket exists.
    ///
    /// The bucket check is bounded by `config.connect_timeout`.
    pub async fn connect(config: S3StorageConfig) -> Result<Self, StorageError> {
        let store = Self::with_client(build_client(&config), &config);

        tokio::time::timeout(config.connect_timeout, store.ensure_bucket())
            .await
            .map_err(|_| StorageError::Timeout(config.connect_timeout))??;

        info!(
            endpoint = %store.endpoint,
            bucket = %store.bucket,
            "connected to object store"
        );
        Ok(store)
    }

    /// Wrap an existing client without touching the network.
    #[must_use]
    pub fn with_client(client: Client, config: &S3StorageConfig) -> Self {
        Self {
            client,
            bucket: config.bucket.clone(),
            kind: config.kind.clone(),
            endpoint: config.endpoint_url(),
        }
    }

    /// Underlying S3 client.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Create the bucket unless it already exists.
    ///
    /// Concurrent creators are tolerated: an "already exists" answer counts as success.
    pub async fn ensure_bucket(&self) -> Result<(), StorageError> {
        let head = self.client.head_bucket().bucket(&self.bucket).send().await;
        let err = match head {
            Ok(_) => {
                debug!(bucket = %self.bucket, "bucket exists");
                return Ok(());
            }
            Err(err) => err,
        };

        let not_found = err
            .as_service_error()
            .is_some_and(aws_sdk_s3::operation::head_bucket::HeadBucketError::is_not_found)
            || response_status(&err) == Some(404);
        if !not_found {
            return Err(map_sdk_error(&err));
        }

        match self.client.create_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                info!(bucket = %self.bucket, "created bucket");
                Ok(())
            }
            Err(err) if created_elsewhere(err.code()) => {
                debug!(bucket = %self.bucket, "bucket created concurrently");
                Ok(())
            }
            Err(err) => Err(map_sdk_error(&err)),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload(
        &self,
        key: &str,
        payload: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let size = payload.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .content_length(i64::try_from(size).unwrap_or(i64::MAX))
            .body(ByteStream::from(payload))
            .send()
            .await
            .map_err(|e| map_sdk_error(&e))?;

        debug!(bucket = %self.bucket, key, size, "object stored");
        Ok(key.to_owned())
    }

    async fn fetch(&self, key: &str) -> Result<Bytes, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(aws_sdk_s3::operation::get_object::GetObjectError::is_no_such_key)
                {
                    StorageError::NotFound(key.to_owned())
                } else {
                    map_sdk_error(&e)
                }
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(body.into_bytes())
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn kind(&self) -> &str {
        &self.kind
    }
}

fn build_client(config: &S3StorageConfig) -> Client {
    let creds = Credentials::new(
        &config.access_key,
        &config.secret_key,
        None,
        None,
        "ondc-edge-static",
    );

    let s3_config = aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .credentials_provider(creds)
        .endpoint_url(config.endpoint_url())
        .force_path_style(true)
        .retry_config(RetryConfig::disabled())
        .build();

    Client::from_conf(s3_config)
}

fn response_status<E>(err: &SdkError<E, HttpResponse>) -> Option<u16> {
    err.raw_response().map(|r| r.status().as_u16())
}

/// Whether a `CreateBucket` error code means another creator got there first.
fn created_elsewhere(code: Option<&str>) -> bool {
    code.is_some_and(|c| BUCKET_EXISTS_CODES.contains(&c))
}

/// How a failed call should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureClass {
    Unavailable,
    WriteFailed,
}

fn classify(transport: bool, code: Option<&str>, status: Option<u16>) -> FailureClass {
    if transport
        || code.is_some_and(|c| AUTH_ERROR_CODES.contains(&c))
        || matches!(status, Some(401 | 403))
    {
        FailureClass::Unavailable
    } else {
        FailureClass::WriteFailed
    }
}

fn map_sdk_error<E>(err: &SdkError<E, HttpResponse>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let transport = matches!(
        err,
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)
    );
    let detail = DisplayErrorContext(err).to_string();

    match classify(transport, err.code(), response_status(err)) {
        FailureClass::Unavailable => StorageError::Unavailable(detail),
        FailureClass::WriteFailed => StorageError::WriteFailed(detail),
    }
}
