//! Pointer events published after a successful upload.

use serde::{Deserialize, Serialize};

use crate::context::IngestionContext;

/// Small message referencing a stored payload.
///
/// # Examples
///
/// ```
/// use ondc_edge_core::pointer::PointerEvent;
///
/// let event: PointerEvent = serde_json::from_str(
///     r#"{"storage":"minio","bucket":"b","object_key":"k","domain":"d","action":"a","transaction_id":"t"}"#,
/// ).unwrap();
/// assert_eq!(event.storage_kind, "minio");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerEvent {
    /// Kind of object store holding the payload (e.g. `minio`).
    #[serde(rename = "storage")]
    pub storage_kind: String,
    /// Bucket holding the payload.
    pub bucket: String,
    /// Key returned by the store.
    pub object_key: String,
    /// Payload domain.
    pub domain: String,
    /// Payload action.
    pub action: String,
    /// Payload transaction id, also the message key.
    pub transaction_id: String,
}

impl PointerEvent {
    /// Build the pointer for an object stored under `object_key`.
    #[must_use]
    pub fn new(
        storage_kind: impl Into<String>,
        bucket: impl Into<String>,
        object_key: impl Into<String>,
        ctx: &IngestionContext,
    ) -> Self {
        Self {
            storage_kind: storage_kind.into(),
            bucket: bucket.into(),
            object_key: object_key.into(),
            domain: ctx.domain().to_owned(),
            action: ctx.action().to_owned(),
            transaction_id: ctx.transaction_id().to_owned(),
        }
    }

    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_use_wire_field_names() {
        let ctx = IngestionContext::extract(
            br#"{"context":{"domain":"ONDC:RET11","action":"on_search","transaction_id":"t1","message_id":"m1"}}"#,
        )
        .unwrap();
        let event = PointerEvent::new("minio", "ondc-payloads", "ondc/k.json", &ctx);

        let value: serde_json::Value = serde_json::from_slice(&event.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "storage": "minio",
                "bucket": "ondc-payloads",
                "object_key": "ondc/k.json",
                "domain": "ONDC:RET11",
                "action": "on_search",
                "transaction_id": "t1",
            })
        );
    }
}
