//! ONDC edge server.
//!
//! Accepts `on_search` callbacks over HTTP, validates them against the schema
//! for their `(domain, action)`, stores the raw payload in S3/MinIO and
//! publishes a pointer event to Kafka keyed by transaction id.
//!
//! # Usage
//!
//! ```text
//! MINIO_ENDPOINT=localhost:9000 MINIO_ACCESS_KEY=minio MINIO_SECRET_KEY=minio123 \
//! KAFKA_BROKERS=localhost:9092 ondc-edge-server
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PORT` | `8080` | Listen port, binds `0.0.0.0` |
//! | `LISTEN_ADDR` | *(unset)* | Full bind address, overrides `PORT` |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `LOG_FORMAT` | `text` | `text` or `json` |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |
//! | `MINIO_ENDPOINT` | *(required)* | `host:port` of the object store |
//! | `MINIO_ACCESS_KEY` | *(required)* | Object store access key |
//! | `MINIO_SECRET_KEY` | *(required)* | Object store secret key |
//! | `MINIO_USE_SSL` | `false` | Reach the object store over TLS |
//! | `MINIO_BUCKET` | `ondc-payloads` | Bucket for raw payloads |
//! | `MINIO_REGION` | `us-east-1` | Signing region |
//! | `STORAGE_KIND` | `minio` | Storage kind recorded in pointer events |
//! | `KAFKA_BROKERS` | *(required)* | Comma-separated bootstrap brokers |
//! | `KAFKA_ON_SEARCH_TOPIC` | `ondc.on_search.pointer` | Pointer topic |
//! | `KAFKA_PUBLISH_TIMEOUT_SECS` | `10` | Publish acknowledgement timeout |
//! | `STORAGE_TIMEOUT_SECS` | `10` | Upload timeout |
//! | `REQUEST_TIMEOUT_SECS` | `30` | Whole-request deadline |
//! | `MAX_BODY_BYTES` | `4194304` | Request body limit |
//! | `OBJECT_KEY_TIMEZONE` | `Asia/Kolkata` | Time zone of the date segment in object keys |

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use ondc_edge_core::config::{EdgeConfig, LogFormat};
use ondc_edge_core::pipeline::{IngestionOrchestrator, PipelineSettings};
use ondc_edge_http::service::{EdgeHttpConfig, EdgeHttpService};
use ondc_edge_kafka::{KafkaPublisher, KafkaPublisherConfig};
use ondc_edge_schema::SchemaRegistry;
use ondc_edge_storage::{S3ObjectStore, S3StorageConfig};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Server version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long in-flight requests may run after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(15);

/// How long to wait for queued Kafka messages on exit.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str, format: LogFormat) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }

    Ok(())
}

/// Resolves once SIGINT or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Run the accept loop, serving connections until a shutdown signal is received.
async fn serve(listener: TcpListener, service: EdgeHttpService) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        shutdown_signal().await;
        info!("received shutdown signal, draining connections");
    };

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.clone();
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    drop(listener);

    if tokio::time::timeout(DRAIN_TIMEOUT, graceful.shutdown())
        .await
        .is_err()
    {
        warn!(
            timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timed out, dropping remaining connections"
        );
    } else {
        info!("all connections drained");
    }

    Ok(())
}

/// Wait for queued pointer events before exiting.
async fn flush_publisher(publisher: Arc<KafkaPublisher>) {
    match tokio::task::spawn_blocking(move || publisher.flush(FLUSH_TIMEOUT)).await {
        Ok(Ok(())) => info!("kafka producer flushed"),
        Ok(Err(e)) => warn!(error = %e, "kafka producer flush incomplete"),
        Err(e) => warn!(error = %e, "kafka flush task failed"),
    }
}

/// Perform a health check by connecting to the server and requesting `/health`.
///
/// Succeeds only on a `200 OK` answer reporting `"status":"ok"`.
async fn run_health_check(addr: &str) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("cannot connect to {addr}"))?;

    let (mut reader, mut writer) = stream.into_split();

    let request = format!("GET /health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    writer.write_all(request.as_bytes()).await?;
    writer.shutdown().await?;

    let mut response = String::new();
    reader.read_to_string(&mut response).await?;

    if response.starts_with("HTTP/1.1 200") && response.contains("\"status\":\"ok\"") {
        Ok(())
    } else {
        anyhow::bail!("unhealthy response from {addr}")
    }
}

/// Bind address from `LISTEN_ADDR`, else `0.0.0.0:{PORT}`.
///
/// Mirrors the resolution in [`EdgeConfig::from_lookup`] without requiring the
/// storage and Kafka settings, so the health probe works on its own.
fn resolve_listen_addr(listen_addr: Option<String>, port: Option<String>) -> String {
    let non_empty = |v: Option<String>| {
        v.map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
    };

    non_empty(listen_addr).unwrap_or_else(|| {
        format!(
            "0.0.0.0:{}",
            non_empty(port).unwrap_or_else(|| "8080".to_owned())
        )
    })
}

/// Address the health probe should dial for a bind address.
fn probe_addr(listen_addr: &str) -> String {
    listen_addr
        .replace("0.0.0.0", "127.0.0.1")
        .replace("[::]", "[::1]")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --health-check flag for container HEALTHCHECK.
    if std::env::args().any(|a| a == "--health-check") {
        let listen_addr = resolve_listen_addr(
            std::env::var("LISTEN_ADDR").ok(),
            std::env::var("PORT").ok(),
        );
        let healthy = run_health_check(&probe_addr(&listen_addr)).await.is_ok();
        std::process::exit(i32::from(!healthy));
    }

    let config = EdgeConfig::from_env().context("invalid configuration")?;
    init_tracing(&config.log_level, config.log_format)?;
    info!(config = ?config, "loaded configuration");

    let registry = SchemaRegistry::embedded().context("failed to compile embedded schemas")?;
    info!(schemas = ?registry.schema_keys(), "schema registry ready");

    let storage_config = S3StorageConfig::from_config(&config);
    info!(
        endpoint = %storage_config.endpoint_url(),
        bucket = %storage_config.bucket,
        "connecting to object store",
    );
    let store = S3ObjectStore::connect(storage_config)
        .await
        .context("object store is not reachable")?;

    let publisher = Arc::new(
        KafkaPublisher::new(&KafkaPublisherConfig::from_config(&config))
            .context("failed to create kafka producer")?,
    );

    let orchestrator = IngestionOrchestrator::new(
        Arc::new(registry),
        Arc::new(store),
        publisher.clone(),
        PipelineSettings::from_config(&config),
    );
    let service = EdgeHttpService::new(orchestrator, EdgeHttpConfig::from_config(&config));

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.listen_addr))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(
        %addr,
        topic = %config.kafka_on_search_topic,
        version = VERSION,
        "starting ONDC edge server",
    );

    serve(listener, service).await?;
    flush_publisher(publisher).await;
    info!("shutdown complete");

    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    async fn canned_server(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0_u8; 1024];
            let _ = stream.read(&mut buf).await.unwrap();
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        });
        addr
    }

    #[test]
    fn test_should_default_to_port_8080() {
        assert_eq!(resolve_listen_addr(None, None), "0.0.0.0:8080");
    }

    #[test]
    fn test_should_bind_port_on_all_interfaces() {
        assert_eq!(
            resolve_listen_addr(None, Some("9090".to_owned())),
            "0.0.0.0:9090"
        );
    }

    #[test]
    fn test_should_prefer_listen_addr_over_port() {
        assert_eq!(
            resolve_listen_addr(Some("127.0.0.1:7000".to_owned()), Some("9090".to_owned())),
            "127.0.0.1:7000"
        );
        assert_eq!(
            resolve_listen_addr(Some("  ".to_owned()), Some("9090".to_owned())),
            "0.0.0.0:9090"
        );
    }

    #[test]
    fn test_should_probe_loopback_for_wildcard_bind() {
        assert_eq!(probe_addr("0.0.0.0:8080"), "127.0.0.1:8080");
        assert_eq!(probe_addr("[::]:8080"), "[::1]:8080");
        assert_eq!(probe_addr("10.0.0.5:8080"), "10.0.0.5:8080");
    }

    #[tokio::test]
    async fn test_should_pass_health_check_on_ok_response() {
        let addr = canned_server(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 44\r\n\r\n\
             {\"status\":\"ok\",\"service\":\"gcr-edge-service\"}",
        )
        .await;
        assert!(run_health_check(&addr).await.is_ok());
    }

    #[tokio::test]
    async fn test_should_fail_health_check_on_error_status() {
        let addr = canned_server("HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\n\r\n").await;
        assert!(run_health_check(&addr).await.is_err());
    }

    #[tokio::test]
    async fn test_should_fail_health_check_when_nothing_listens() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        assert!(run_health_check(&addr).await.is_err());
    }
}
