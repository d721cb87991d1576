//! Integration tests for the ONDC edge server.
//!
//! These tests require a running edge server (default `localhost:8080`) wired
//! to a MinIO instance (default `localhost:9000`) and a Kafka broker. They are
//! marked `#[ignore]` so they don't run during normal `cargo test`.
//!
//! Run them with:
//! ```text
//! cargo test -p ondc-edge-integration -- --ignored
//! ```

use std::sync::Once;

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};

static INIT: Once = Once::new();

/// RET18 `search` sample accepted by the embedded schemas.
pub const RET18_SEARCH: &str = include_str!("../../../crates/ondc-edge-schema/fixtures/ret18_search.json");

/// RET11 `on_search` sample accepted by the embedded schemas.
pub const RET11_ON_SEARCH: &str =
    include_str!("../../../crates/ondc-edge-schema/fixtures/ret11_on_search.json");

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_owned())
}

/// Base URL of the edge server.
#[must_use]
pub fn edge_url() -> String {
    env_or("EDGE_URL", "http://localhost:8080")
}

/// Bucket the server writes payloads to.
#[must_use]
pub fn payload_bucket() -> String {
    env_or("MINIO_BUCKET", "ondc-payloads")
}

/// HTTP client for the edge server.
#[must_use]
pub fn http_client() -> reqwest::Client {
    init_tracing();
    reqwest::Client::new()
}

/// Create a configured S3 client pointing at the MinIO instance behind the server.
#[must_use]
pub fn s3_client() -> aws_sdk_s3::Client {
    init_tracing();

    let creds = Credentials::new(
        env_or("MINIO_ACCESS_KEY", "minioadmin"),
        env_or("MINIO_SECRET_KEY", "minioadmin"),
        None,
        None,
        "integration-test",
    );

    let config = aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(env_or("MINIO_REGION", "us-east-1")))
        .credentials_provider(creds)
        .endpoint_url(env_or("MINIO_ENDPOINT_URL", "http://localhost:9000"))
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(config)
}

/// Copy a fixture with a fresh transaction id so stored objects can be found.
///
/// Returns the payload and the transaction id it carries.
#[must_use]
pub fn with_fresh_transaction(fixture: &str) -> (String, String) {
    let mut doc: serde_json::Value =
        serde_json::from_str(fixture).unwrap_or_else(|e| panic!("fixture is not JSON: {e}"));
    let txn = uuid::Uuid::new_v4().to_string();
    doc["context"]["transaction_id"] = serde_json::Value::String(txn.clone());
    (doc.to_string(), txn)
}

/// Find the object stored for `transaction_id` under `prefix`.
pub async fn find_stored_key(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    prefix: &str,
    transaction_id: &str,
) -> Option<String> {
    let mut continuation_token = None;
    loop {
        let mut req = client.list_objects_v2().bucket(bucket).prefix(prefix);
        if let Some(token) = continuation_token.take() {
            req = req.continuation_token(token);
        }
        let resp = req
            .send()
            .await
            .unwrap_or_else(|e| panic!("failed to list {bucket}/{prefix}: {e}"));

        let found = resp
            .contents()
            .iter()
            .filter_map(|obj| obj.key())
            .find(|key| key.contains(transaction_id));
        if let Some(key) = found {
            return Some(key.to_owned());
        }

        if resp.is_truncated() == Some(true) {
            continuation_token = resp.next_continuation_token().map(ToOwned::to_owned);
        } else {
            return None;
        }
    }
}

mod test_http;
mod test_ingest;
