//! Schema registry.

use std::collections::HashMap;
use std::fmt;

use jsonschema::Validator;
use ondc_edge_core::context::schema_key;
use ondc_edge_core::error::ValidationError;
use ondc_edge_core::ports::SchemaValidator;
use tracing::debug;

/// Schemas compiled into the binary: `(domain, action, schema source)`.
const EMBEDDED_SCHEMAS: &[(&str, &str, &str)] = &[
    (
        "ONDC:RET11",
        "on_search",
        include_str!("../schemas/ret11_on_search.schema.json"),
    ),
    (
        "ONDC:RET18",
        "search",
        include_str!("../schemas/ret18_search.schema.json"),
    ),
];

/// Failure compiling a schema source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaCompileError {
    /// The source is not JSON.
    #[error("schema for {key} is not valid JSON: {reason}")]
    InvalidJson {
        /// Registry key of the source.
        key: String,
        /// Parser message.
        reason: String,
    },

    /// The source is JSON but not a valid JSON Schema.
    #[error("schema for {key} failed to compile: {reason}")]
    InvalidSchema {
        /// Registry key of the source.
        key: String,
        /// Compiler message.
        reason: String,
    },

    /// Two sources share a domain/action pair.
    #[error("duplicate schema registered for {0}")]
    Duplicate(String),
}

/// One schema to register.
#[derive(Debug, Clone, Copy)]
pub struct SchemaSource<'a> {
    /// Network domain, e.g. `ONDC:RET11`.
    pub domain: &'a str,
    /// Action, e.g. `on_search`.
    pub action: &'a str,
    /// Schema document.
    pub schema: &'a str,
}

/// Immutable map from `domain:action` to a compiled validator.
///
/// # Examples
///
/// ```
/// use ondc_edge_schema::SchemaRegistry;
///
/// let registry = SchemaRegistry::embedded().unwrap();
/// assert!(registry.contains("ONDC:RET11", "on_search"));
/// ```
pub struct SchemaRegistry {
    schemas: HashMap<String, Validator>,
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("schemas", &self.schema_keys())
            .finish()
    }
}

impl SchemaRegistry {
    /// Compile every source; the first invalid one aborts.
    pub fn compile<'a, I>(sources: I) -> Result<Self, SchemaCompileError>
    where
        I: IntoIterator<Item = SchemaSource<'a>>,
    {
        let mut schemas = HashMap::new();

        for source in sources {
            let key = schema_key(source.domain, source.action);
            if schemas.contains_key(&key) {
                return Err(SchemaCompileError::Duplicate(key));
            }

            let document: serde_json::Value =
                serde_json::from_str(source.schema).map_err(|e| SchemaCompileError::InvalidJson {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;
            let validator =
                Validator::new(&document).map_err(|e| SchemaCompileError::InvalidSchema {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;

            debug!(schema = %key, "compiled schema");
            schemas.insert(key, validator);
        }

        Ok(Self { schemas })
    }

    /// Compile the schemas shipped with the binary.
    pub fn embedded() -> Result<Self, SchemaCompileError> {
        Self::compile(
            EMBEDDED_SCHEMAS
                .iter()
                .map(|&(domain, action, schema)| SchemaSource {
                    domain,
                    action,
                    schema,
                }),
        )
    }

    /// Registered keys, sorted.
    #[must_use]
    pub fn schema_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Whether a schema exists for the pair.
    #[must_use]
    pub fn contains(&self, domain: &str, action: &str) -> bool {
        self.schemas.contains_key(&schema_key(domain, action))
    }

    /// Validate `payload` against the schema for `domain`/`action`.
    ///
    /// The schema is looked up before the payload is parsed, so an unknown pair
    /// is reported regardless of payload content.
    pub fn validate(&self, domain: &str, action: &str, payload: &[u8]) -> Result<(), ValidationError> {
        let key = schema_key(domain, action);
        let Some(validator) = self.schemas.get(&key) else {
            return Err(ValidationError::UnknownSchema {
                domain: domain.to_owned(),
                action: action.to_owned(),
            });
        };

        let instance: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| ValidationError::MalformedPayload(e.to_string()))?;

        let violations: Vec<String> = validator
            .iter_errors(&instance)
            .map(|e| format!("{e} at {}", e.instance_path))
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::SchemaViolation {
                schema_key: key,
                violations,
            })
        }
    }
}

impl SchemaValidator for SchemaRegistry {
    fn validate(&self, domain: &str, action: &str, payload: &[u8]) -> Result<(), ValidationError> {
        SchemaRegistry::validate(self, domain, action, payload)
    }
}
