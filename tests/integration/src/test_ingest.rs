//! End-to-end ingestion tests: payloads posted to the server land in MinIO.

#[cfg(test)]
mod tests {
    use crate::{
        RET11_ON_SEARCH, RET18_SEARCH, edge_url, find_stored_key, http_client, payload_bucket,
        s3_client, with_fresh_transaction,
    };

    async fn post_and_fetch(fixture: &str, prefix: &str) {
        let (payload, txn) = with_fresh_transaction(fixture);

        let resp = http_client()
            .post(format!("{}/on-search", edge_url()))
            .header("content-type", "application/json")
            .body(payload.clone())
            .send()
            .await
            .expect("post payload");
        assert_eq!(resp.status().as_u16(), 202);
        let body: serde_json::Value = resp.json().await.expect("json body");
        assert_eq!(body["status"], "accepted");

        let client = s3_client();
        let bucket = payload_bucket();
        let key = find_stored_key(&client, &bucket, prefix, &txn)
            .await
            .unwrap_or_else(|| panic!("no object stored for {txn} under {prefix}"));
        assert!(key.ends_with(".json"), "{key}");

        let object = client
            .get_object()
            .bucket(&bucket)
            .key(&key)
            .send()
            .await
            .expect("get_object");
        assert_eq!(object.content_type(), Some("application/json"));
        let data = object
            .body
            .collect()
            .await
            .expect("collect body")
            .into_bytes();
        assert_eq!(data.as_ref(), payload.as_bytes());
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_store_ret18_search_payload() {
        post_and_fetch(RET18_SEARCH, "ondc/ONDC_RET18/search/").await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_store_ret11_on_search_payload() {
        post_and_fetch(RET11_ON_SEARCH, "ondc/ONDC_RET11/on_search/").await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_not_store_invalid_payload() {
        let (payload, txn) = with_fresh_transaction(RET11_ON_SEARCH);
        let mut doc: serde_json::Value = serde_json::from_str(&payload).unwrap();
        doc["message"]
            .as_object_mut()
            .expect("message object")
            .remove("catalog");

        let resp = http_client()
            .post(format!("{}/on-search", edge_url()))
            .body(doc.to_string())
            .send()
            .await
            .expect("post payload");
        assert_eq!(resp.status().as_u16(), 400);
        let body: serde_json::Value = resp.json().await.expect("json body");
        assert_eq!(body["code"], "SCHEMA_VIOLATION");
        assert_eq!(body["stage"], "validation");

        let stored = find_stored_key(
            &s3_client(),
            &payload_bucket(),
            "ondc/ONDC_RET11/on_search/",
            &txn,
        )
        .await;
        assert!(stored.is_none(), "{stored:?}");
    }
}
