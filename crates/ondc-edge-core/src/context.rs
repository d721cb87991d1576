//! Routing context extraction.
//!
//! ONDC payloads can run to several megabytes, but routing only needs four
//! strings from the `context` envelope. [`IngestionContext::extract`] drives
//! serde with hand-written visitors that descend into the top-level `context`
//! object and skip every other value with [`IgnoredAny`], so no document tree is
//! ever built. Full structural parsing is left to schema validation.
//!
//! Non-string or empty routing fields are treated the same as absent ones, and a
//! `context` that is not an object counts as missing.

use std::borrow::Cow;
use std::fmt;

use serde::de::{self, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;

use crate::error::ContextError;

/// Routing metadata read from the payload's `context` envelope.
///
/// All four fields are guaranteed non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionContext {
    domain: String,
    action: String,
    transaction_id: String,
    message_id: String,
}

impl IngestionContext {
    /// Read the routing fields from a raw payload.
    ///
    /// # Examples
    ///
    /// ```
    /// use ondc_edge_core::context::IngestionContext;
    ///
    /// let payload = br#"{"context":{"domain":"ONDC:RET18","action":"search",
    ///     "transaction_id":"t1","message_id":"m1"},"message":{}}"#;
    /// let ctx = IngestionContext::extract(payload).unwrap();
    /// assert_eq!(ctx.schema_key(), "ONDC:RET18:search");
    /// ```
    pub fn extract(payload: &[u8]) -> Result<Self, ContextError> {
        let envelope: Envelope<'_> =
            serde_json::from_slice(payload).map_err(|e| ContextError::Malformed(e.to_string()))?;
        let fields = envelope.context.ok_or(ContextError::MissingContext)?;

        Ok(Self {
            domain: required("domain", fields.domain)?,
            action: required("action", fields.action)?,
            transaction_id: required("transaction_id", fields.transaction_id)?,
            message_id: required("message_id", fields.message_id)?,
        })
    }

    /// Network domain, e.g. `ONDC:RET11`.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Callback action, e.g. `on_search`.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Transaction identifier shared by all messages of one transaction.
    #[must_use]
    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    /// Identifier of this message.
    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Registry lookup key, `domain:action`.
    #[must_use]
    pub fn schema_key(&self) -> String {
        schema_key(&self.domain, &self.action)
    }
}

/// Build the registry lookup key for a domain/action pair.
#[must_use]
pub fn schema_key(domain: &str, action: &str) -> String {
    format!("{domain}:{action}")
}

fn required(name: &'static str, value: Option<Cow<'_, str>>) -> Result<String, ContextError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v.into_owned()),
        _ => Err(ContextError::MissingField(name)),
    }
}

// ---------------------------------------------------------------------------
// Streaming visitors
// ---------------------------------------------------------------------------

/// Visitor methods shared by every visitor below: scalars and arrays are
/// consumed and mapped to `$value`.
macro_rules! skip_non_objects {
    ($de:lifetime, $value:expr) => {
        fn visit_bool<E: de::Error>(self, _: bool) -> Result<Self::Value, E> {
            Ok($value)
        }

        fn visit_i64<E: de::Error>(self, _: i64) -> Result<Self::Value, E> {
            Ok($value)
        }

        fn visit_u64<E: de::Error>(self, _: u64) -> Result<Self::Value, E> {
            Ok($value)
        }

        fn visit_f64<E: de::Error>(self, _: f64) -> Result<Self::Value, E> {
            Ok($value)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok($value)
        }

        fn visit_seq<A: SeqAccess<$de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            while seq.next_element::<IgnoredAny>()?.is_some() {}
            Ok($value)
        }
    };
}

/// Top-level document: only `context` is kept.
struct Envelope<'a> {
    context: Option<ContextFields<'a>>,
}

impl<'de> Deserialize<'de> for Envelope<'de> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(EnvelopeVisitor)
    }
}

struct EnvelopeVisitor;

impl<'de> Visitor<'de> for EnvelopeVisitor {
    type Value = Envelope<'de>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON document")
    }

    skip_non_objects!('de, Envelope { context: None });

    fn visit_str<E: de::Error>(self, _: &str) -> Result<Self::Value, E> {
        Ok(Envelope { context: None })
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut context = None;
        while let Some(key) = map.next_key::<EnvelopeKey>()? {
            match key {
                EnvelopeKey::Context => context = map.next_value::<ContextSlot<'de>>()?.0,
                EnvelopeKey::Other => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(Envelope { context })
    }
}

enum EnvelopeKey {
    Context,
    Other,
}

impl<'de> Deserialize<'de> for EnvelopeKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl Visitor<'_> for KeyVisitor {
            type Value = EnvelopeKey;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object key")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(if v == "context" {
                    EnvelopeKey::Context
                } else {
                    EnvelopeKey::Other
                })
            }
        }

        deserializer.deserialize_identifier(KeyVisitor)
    }
}

/// The four routing fields, borrowed from the input where no unescaping is needed.
#[derive(Default)]
struct ContextFields<'a> {
    domain: Option<Cow<'a, str>>,
    action: Option<Cow<'a, str>>,
    transaction_id: Option<Cow<'a, str>>,
    message_id: Option<Cow<'a, str>>,
}

/// `context` value; `None` when it is not an object.
struct ContextSlot<'a>(Option<ContextFields<'a>>);

impl<'de> Deserialize<'de> for ContextSlot<'de> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ContextVisitor)
    }
}

struct ContextVisitor;

impl<'de> Visitor<'de> for ContextVisitor {
    type Value = ContextSlot<'de>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a context object")
    }

    skip_non_objects!('de, ContextSlot(None));

    fn visit_str<E: de::Error>(self, _: &str) -> Result<Self::Value, E> {
        Ok(ContextSlot(None))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut fields = ContextFields::default();
        while let Some(key) = map.next_key::<ContextKey>()? {
            let slot = match key {
                ContextKey::Domain => &mut fields.domain,
                ContextKey::Action => &mut fields.action,
                ContextKey::TransactionId => &mut fields.transaction_id,
                ContextKey::MessageId => &mut fields.message_id,
                ContextKey::Other => {
                    map.next_value::<IgnoredAny>()?;
                    continue;
                }
            };
            *slot = map.next_value::<LenientStr<'de>>()?.0;
        }
        Ok(ContextSlot(Some(fields)))
    }
}

enum ContextKey {
    Domain,
    Action,
    TransactionId,
    MessageId,
    Other,
}

impl<'de> Deserialize<'de> for ContextKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl Visitor<'_> for KeyVisitor {
            type Value = ContextKey;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a context key")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(match v {
                    "domain" => ContextKey::Domain,
                    "action" => ContextKey::Action,
                    "transaction_id" => ContextKey::TransactionId,
                    "message_id" => ContextKey::MessageId,
                    _ => ContextKey::Other,
                })
            }
        }

        deserializer.deserialize_identifier(KeyVisitor)
    }
}

/// A string value, or `None` for any other JSON type.
struct LenientStr<'a>(Option<Cow<'a, str>>);

impl<'de> Deserialize<'de> for LenientStr<'de> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(LenientStrVisitor)
    }
}

struct LenientStrVisitor;

impl<'de> Visitor<'de> for LenientStrVisitor {
    type Value = LenientStr<'de>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string")
    }

    skip_non_objects!('de, LenientStr(None));

    fn visit_borrowed_str<E: de::Error>(self, v: &'de str) -> Result<Self::Value, E> {
        Ok(LenientStr(Some(Cow::Borrowed(v))))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(LenientStr(Some(Cow::Owned(v.to_owned()))))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(LenientStr(Some(Cow::Owned(v))))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(LenientStr(None))
    }
}
