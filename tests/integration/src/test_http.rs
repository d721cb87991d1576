//! HTTP surface tests: routing, limits and headers.

#[cfg(test)]
mod tests {
    use crate::{edge_url, http_client};

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_report_healthy() {
        let resp = http_client()
            .get(format!("{}/health", edge_url()))
            .send()
            .await
            .expect("health");
        assert_eq!(resp.status().as_u16(), 200);
        let body: serde_json::Value = resp.json().await.expect("json body");
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_echo_request_id() {
        let resp = http_client()
            .post(format!("{}/on-search", edge_url()))
            .header("x-request-id", "integration-req-1")
            .body("")
            .send()
            .await
            .expect("post");
        assert_eq!(resp.status().as_u16(), 400);
        assert_eq!(
            resp.headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok()),
            Some("integration-req-1")
        );
        let body: serde_json::Value = resp.json().await.expect("json body");
        assert_eq!(body["code"], "EMPTY_PAYLOAD");
        assert_eq!(body["request_id"], "integration-req-1");
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_reject_missing_context_field() {
        let resp = http_client()
            .post(format!("{}/on-search", edge_url()))
            .body(r#"{"context":{"action":"on_search","transaction_id":"t","message_id":"m"}}"#)
            .send()
            .await
            .expect("post");
        assert_eq!(resp.status().as_u16(), 400);
        let body: serde_json::Value = resp.json().await.expect("json body");
        assert_eq!(body["code"], "MISSING_REQUIRED_FIELD");
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_reject_oversized_body() {
        let limit: usize = std::env::var("MAX_BODY_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(4 * 1024 * 1024);
        let resp = http_client()
            .post(format!("{}/on-search", edge_url()))
            .body(vec![b' '; limit + 1])
            .send()
            .await
            .expect("post");
        assert_eq!(resp.status().as_u16(), 413);
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_return_not_found_for_unknown_path() {
        let resp = http_client()
            .post(format!("{}/search", edge_url()))
            .body("{}")
            .send()
            .await
            .expect("post");
        assert_eq!(resp.status().as_u16(), 404);
    }
}
