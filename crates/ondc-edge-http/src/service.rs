//! The edge HTTP service implementing hyper's `Service` trait.
//!
//! [`EdgeHttpService`] handles, in order:
//!
//! 1. Request id assignment (propagated `X-Request-ID` or a fresh UUID)
//! 2. Health check interception (`GET /health`, `GET /_health`)
//! 3. CORS preflight requests (`OPTIONS`)
//! 4. Routing: `POST /on-search` is the only ingestion route
//! 5. Bounded body collection (`413` above the configured limit)
//! 6. Ingestion through the [`IngestionOrchestrator`], bounded by the request timeout
//! 7. Common response headers and completion logging
//!
//! A panic anywhere in the handler answers `500` instead of dropping the connection.

use std::convert::Infallible;
use std::error::Error as StdError;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;
use http::header::{self, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use http_body::Body;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::service::Service;
use ondc_edge_core::config::{EdgeConfig, MAX_TIMEOUT_SECS};
use ondc_edge_core::pipeline::IngestionOrchestrator;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::response::{
    EdgeResponseBody, REQUEST_ID_HEADER, accepted_response, add_common_headers,
    cors_preflight_response, error_to_response, health_response, http_error_response,
};

/// Path accepting `on_search` callbacks.
pub const INGEST_PATH: &str = "/on-search";

const MAX_REQUEST_ID_LEN: usize = 128;

/// Ceiling applied to `request_timeout`, matching the configuration limit.
const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(MAX_TIMEOUT_SECS);

/// Configuration for the edge HTTP service.
#[derive(Debug, Clone, TypedBuilder)]
pub struct EdgeHttpConfig {
    /// Largest accepted request body.
    #[builder(default = 4 * 1024 * 1024)]
    pub max_body_bytes: usize,

    /// Upper bound on one request, body read included.
    #[builder(default = Duration::from_secs(30))]
    pub request_timeout: Duration,

    /// Service name reported by the health endpoint.
    #[builder(default = String::from("gcr-edge-service"), setter(into))]
    pub service_name: String,
}

impl Default for EdgeHttpConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl EdgeHttpConfig {
    /// Take the HTTP limits from the service configuration.
    #[must_use]
    pub fn from_config(config: &EdgeConfig) -> Self {
        Self::builder()
            .max_body_bytes(config.max_body_bytes)
            .request_timeout(config.request_timeout())
            .build()
    }
}

/// Hyper service in front of the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct EdgeHttpService {
    orchestrator: IngestionOrchestrator,
    config: Arc<EdgeHttpConfig>,
}

impl EdgeHttpService {
    /// Create a new service.
    #[must_use]
    pub fn new(orchestrator: IngestionOrchestrator, config: EdgeHttpConfig) -> Self {
        Self {
            orchestrator,
            config: Arc::new(config),
        }
    }

    /// Handle one request with any body type.
    pub async fn handle<B>(&self, req: http::Request<B>) -> http::Response<EdgeResponseBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let started = Instant::now();
        let request_id = request_id_from(req.headers());
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        let probe = is_health_check(&method, &path);

        if !probe {
            debug!(%method, path, request_id, "request started");
        }

        let response = AssertUnwindSafe(self.route(req, &request_id))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                error!(%method, path, request_id, "request handler panicked");
                http_error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_FAULT",
                    "unexpected internal fault",
                    &request_id,
                )
            });
        let response = add_common_headers(response, &request_id);

        if !probe {
            info!(
                %method,
                path,
                status = response.status().as_u16(),
                latency = ?started.elapsed(),
                size = response.body().size_hint().exact().unwrap_or(0),
                request_id,
                "request completed"
            );
        }
        response
    }

    async fn route<B>(&self, req: http::Request<B>, request_id: &str) -> http::Response<EdgeResponseBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();

        if is_health_check(&method, &path) {
            return health_response(&self.config.service_name);
        }
        if method == Method::OPTIONS {
            return cors_preflight_response();
        }
        if path != INGEST_PATH {
            return http_error_response(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("no route for {method} {path}"),
                request_id,
            );
        }
        if method != Method::POST {
            let mut response = http_error_response(
                StatusCode::METHOD_NOT_ALLOWED,
                "METHOD_NOT_ALLOWED",
                &format!("method {method} not allowed on {INGEST_PATH}"),
                request_id,
            );
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("POST, OPTIONS"));
            return response;
        }

        let deadline = Instant::now() + self.config.request_timeout.min(MAX_REQUEST_TIMEOUT);
        match tokio::time::timeout_at(deadline, self.ingest(req, deadline, request_id)).await {
            Ok(response) => response,
            Err(_) => {
                warn!(request_id, timeout = ?self.config.request_timeout, "request timed out");
                http_error_response(
                    StatusCode::GATEWAY_TIMEOUT,
                    "REQUEST_TIMEOUT",
                    "request timed out",
                    request_id,
                )
            }
        }
    }

    async fn ingest<B>(
        &self,
        req: http::Request<B>,
        deadline: Instant,
        request_id: &str,
    ) -> http::Response<EdgeResponseBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let limit = self.config.max_body_bytes;
        if declared_length(req.headers()).is_some_and(|len| len > limit) {
            return payload_too_large(limit, request_id);
        }

        let payload = match Limited::new(req.into_body(), limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
                return payload_too_large(limit, request_id);
            }
            Err(err) => {
                warn!(error = %err, request_id, "failed to read request body");
                return http_error_response(
                    StatusCode::BAD_REQUEST,
                    "BODY_READ_FAILED",
                    "failed to read request body",
                    request_id,
                );
            }
        };

        match self.orchestrator.ingest(payload, deadline).await {
            Ok(receipt) => {
                info!(
                    request_id,
                    transaction_id = %receipt.transaction_id,
                    message_id = %receipt.message_id,
                    domain = %receipt.domain,
                    action = %receipt.action,
                    bucket = %receipt.bucket,
                    object_key = %receipt.object_key,
                    "payload accepted"
                );
                accepted_response()
            }
            Err(err) => {
                if err.kind.is_client_fault() {
                    warn!(
                        request_id,
                        stage = %err.stage,
                        code = err.kind.code(),
                        details = err.details.as_deref().unwrap_or_default(),
                        "payload rejected: {}",
                        err.message
                    );
                } else {
                    error!(
                        request_id,
                        stage = %err.stage,
                        code = err.kind.code(),
                        details = err.details.as_deref().unwrap_or_default(),
                        "ingestion failed: {}",
                        err.message
                    );
                }
                error_to_response(&err, request_id)
            }
        }
    }
}

impl Service<http::Request<Incoming>> for EdgeHttpService {
    type Response = http::Response<EdgeResponseBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(req).await) })
    }
}

/// Check if the request is a health check probe.
fn is_health_check(method: &Method, path: &str) -> bool {
    *method == Method::GET && (path == "/health" || path == "/_health")
}

/// Use the caller's `X-Request-ID` when it is usable, otherwise mint one.
fn request_id_from(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map_or_else(|| Uuid::new_v4().to_string(), ToOwned::to_owned)
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn payload_too_large(limit: usize, request_id: &str) -> http::Response<EdgeResponseBody> {
    http_error_response(
        StatusCode::PAYLOAD_TOO_LARGE,
        "PAYLOAD_TOO_LARGE",
        &format!("request body exceeds {limit} bytes"),
        request_id,
    )
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use http_body_util::Full;
    use ondc_edge_core::error::{PublishError, StorageError};
    use ondc_edge_core::memory::{MemoryObjectStore, RecordingPublisher};
    use ondc_edge_core::pipeline::PipelineSettings;
    use ondc_edge_core::pointer::PointerEvent;
    use ondc_edge_core::ports::{EventPublisher, ObjectStore};
    use ondc_edge_schema::SchemaRegistry;

    use super::*;

    const RET11_ON_SEARCH: &str = include_str!("../../ondc-edge-schema/fixtures/ret11_on_search.json");
    const RET18_SEARCH: &str = include_str!("../../ondc-edge-schema/fixtures/ret18_search.json");

    /// Publisher that panics, to exercise the panic boundary.
    #[derive(Debug)]
    struct PanickingPublisher;

    #[async_trait]
    impl EventPublisher for PanickingPublisher {
        async fn publish(&self, _: &str, _: &str, _: Vec<u8>) -> Result<(), PublishError> {
            panic!("publisher exploded");
        }
    }

    struct Harness {
        service: EdgeHttpService,
        store: Arc<MemoryObjectStore>,
        publisher: Arc<RecordingPublisher>,
    }

    fn harness_with(config: EdgeHttpConfig) -> Harness {
        let store = Arc::new(MemoryObjectStore::new("ondc-payloads").with_kind("minio"));
        let publisher = Arc::new(RecordingPublisher::new());
        let orchestrator = IngestionOrchestrator::new(
            Arc::new(SchemaRegistry::embedded().unwrap()),
            store.clone(),
            publisher.clone(),
            PipelineSettings::default(),
        );
        Harness {
            service: EdgeHttpService::new(orchestrator, config),
            store,
            publisher,
        }
    }

    fn harness() -> Harness {
        harness_with(EdgeHttpConfig::default())
    }

    fn request(method: &str, uri: &str, body: impl Into<Bytes>) -> http::Request<Full<Bytes>> {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(body.into()))
            .unwrap()
    }

    fn post(body: impl Into<Bytes>) -> http::Request<Full<Bytes>> {
        request("POST", INGEST_PATH, body)
    }

    async fn body_json(response: http::Response<EdgeResponseBody>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_should_answer_health_check() {
        let h = harness();
        for path in ["/health", "/_health"] {
            let response = h.service.handle(request("GET", path, Bytes::new())).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                body_json(response).await,
                serde_json::json!({"status": "ok", "service": "gcr-edge-service"})
            );
        }
    }

    #[tokio::test]
    async fn test_should_accept_ret18_search() {
        let h = harness();
        let response = h.service.handle(post(RET18_SEARCH)).await;

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"status": "accepted"})
        );

        let uploads = h.store.upload_calls();
        assert_eq!(uploads.len(), 1);
        assert!(uploads[0].starts_with("ondc/ONDC_RET18/search/"));

        let messages = h.publisher.messages();
        assert_eq!(messages.len(), 1);
        let event: PointerEvent = serde_json::from_slice(&messages[0].value).unwrap();
        assert_eq!(event.domain, "ONDC:RET18");
        assert_eq!(event.object_key, uploads[0]);
        assert_eq!(
            h.store.fetch(&event.object_key).await.unwrap(),
            Bytes::from_static(RET18_SEARCH.as_bytes())
        );
    }

    #[tokio::test]
    async fn test_should_accept_ret11_on_search() {
        let h = harness();
        let response = h.service.handle(post(RET11_ON_SEARCH)).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(h.publisher.messages()[0].key, "6c4a2b1e-7a77-4d6b-9c3e-1f0f3c1f7d11");
    }

    #[tokio::test]
    async fn test_should_reject_ret11_on_search_without_catalog() {
        let h = harness();
        let mut doc: serde_json::Value = serde_json::from_str(RET11_ON_SEARCH).unwrap();
        doc["message"].as_object_mut().unwrap().remove("catalog");
        let response = h
            .service
            .handle(post(serde_json::to_vec(&doc).unwrap()))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "SCHEMA_VIOLATION");
        assert_eq!(body["stage"], "validation");
        assert!(body["details"].as_str().unwrap().contains("catalog"));
        assert!(h.store.upload_calls().is_empty());
        assert_eq!(h.publisher.attempts(), 0);
    }

    #[tokio::test]
    async fn test_should_reject_missing_domain() {
        let h = harness();
        let mut doc: serde_json::Value = serde_json::from_str(RET18_SEARCH).unwrap();
        doc["context"].as_object_mut().unwrap().remove("domain");
        let response = h
            .service
            .handle(post(serde_json::to_vec(&doc).unwrap()))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "MISSING_REQUIRED_FIELD");
        assert_eq!(body["stage"], "context_extraction");
        assert!(h.store.upload_calls().is_empty());
    }

    #[tokio::test]
    async fn test_should_reject_unknown_schema() {
        let h = harness();
        let body = RET18_SEARCH.replace("ONDC:RET18", "ONDC:RET10");
        let response = h.service.handle(post(body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "UNKNOWN_SCHEMA");
    }

    #[tokio::test]
    async fn test_should_reject_empty_body() {
        let h = harness();
        let response = h.service.handle(post(Bytes::new())).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "EMPTY_PAYLOAD");
    }

    #[tokio::test]
    async fn test_should_map_storage_outage_to_503() {
        let h = harness();
        h.store
            .fail_with(StorageError::Unavailable("connection refused".into()));
        let response = h.service.handle(post(RET18_SEARCH)).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["code"], "STORAGE_UNAVAILABLE");
        assert_eq!(body["stage"], "storage");
        assert_eq!(h.publisher.attempts(), 0);
    }

    #[tokio::test]
    async fn test_should_time_out_slow_request() {
        let h = harness_with(
            EdgeHttpConfig::builder()
                .request_timeout(Duration::from_millis(50))
                .build(),
        );
        h.store.delay_uploads(Duration::from_millis(500));
        let response = h.service.handle(post(RET18_SEARCH)).await;

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let code = body_json(response).await["code"].clone();
        assert!(
            code == "REQUEST_TIMEOUT" || code == "STORAGE_TIMEOUT",
            "{code}"
        );
        assert_eq!(h.publisher.attempts(), 0);
    }

    #[tokio::test]
    async fn test_should_accept_with_unbounded_request_timeout() {
        let h = harness_with(
            EdgeHttpConfig::builder()
                .request_timeout(Duration::MAX)
                .build(),
        );
        let response = h.service.handle(post(RET18_SEARCH)).await;

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(h.publisher.attempts(), 1);
    }

    #[tokio::test]
    async fn test_should_reject_oversized_body() {
        let h = harness_with(EdgeHttpConfig::builder().max_body_bytes(64).build());
        let response = h.service.handle(post(RET18_SEARCH)).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body_json(response).await["code"], "PAYLOAD_TOO_LARGE");
        assert!(h.store.upload_calls().is_empty());
    }

    #[tokio::test]
    async fn test_should_reject_oversized_declared_length() {
        let h = harness_with(EdgeHttpConfig::builder().max_body_bytes(64).build());
        let mut req = post("{}");
        req.headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from_static("1000000"));
        let response = h.service.handle(req).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_should_return_404_for_unknown_path() {
        let h = harness();
        let response = h.service.handle(request("POST", "/search", "{}")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_should_return_405_for_wrong_method() {
        let h = harness();
        let response = h
            .service
            .handle(request("GET", INGEST_PATH, Bytes::new()))
            .await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(header::ALLOW).unwrap(), "POST, OPTIONS");
    }

    #[tokio::test]
    async fn test_should_answer_cors_preflight() {
        let h = harness();
        let response = h
            .service
            .handle(request("OPTIONS", INGEST_PATH, Bytes::new()))
            .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_should_propagate_request_id() {
        let h = harness();
        let mut req = post(Bytes::new());
        req.headers_mut()
            .insert(REQUEST_ID_HEADER, HeaderValue::from_static("req-42"));
        let response = h.service.handle(req).await;

        assert_eq!(response.headers().get(REQUEST_ID_HEADER).unwrap(), "req-42");
        assert_eq!(body_json(response).await["request_id"], "req-42");
    }

    #[tokio::test]
    async fn test_should_turn_panic_into_500() {
        let store = Arc::new(MemoryObjectStore::new("ondc-payloads"));
        let orchestrator = IngestionOrchestrator::new(
            Arc::new(SchemaRegistry::embedded().unwrap()),
            store.clone(),
            Arc::new(PanickingPublisher),
            PipelineSettings::default(),
        );
        let service = EdgeHttpService::new(orchestrator, EdgeHttpConfig::default());

        let response = service.handle(post(RET18_SEARCH)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["code"], "INTERNAL_FAULT");
        assert_eq!(body["stage"], "publish");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_should_mint_request_id_when_header_is_unusable() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_id_from(&headers).len(), 36);

        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("   "));
        assert_eq!(request_id_from(&headers).len(), 36);

        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static(" abc "));
        assert_eq!(request_id_from(&headers), "abc");
    }
}
