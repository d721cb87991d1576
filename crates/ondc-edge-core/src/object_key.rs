//! Object key generation.
//!
//! Keys have the shape
//! `ondc/{domain}/{action}/{YYYY-MM-DD_HH-MM-SS}/{transaction_id}_{uuid}.json`,
//! where `:` in the domain becomes `_` and the timestamp is rendered in a fixed
//! civil timezone. The UUID v4 suffix keeps two uploads of the same transaction
//! in the same second apart.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::warn;
use uuid::Uuid;

use crate::context::IngestionContext;

/// Default timezone for the date segment.
pub const DEFAULT_KEY_TIMEZONE: &str = "Asia/Kolkata";

const KEY_PREFIX: &str = "ondc";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Builds storage keys for incoming payloads.
#[derive(Debug, Clone, Copy)]
pub struct ObjectKeyScheme {
    tz: Tz,
}

impl Default for ObjectKeyScheme {
    fn default() -> Self {
        Self { tz: chrono_tz::Asia::Kolkata }
    }
}

impl ObjectKeyScheme {
    /// Create a scheme rendering dates in the named IANA timezone.
    ///
    /// Unknown names fall back to UTC.
    #[must_use]
    pub fn new(timezone: &str) -> Self {
        let tz = timezone.parse::<Tz>().unwrap_or_else(|e| {
            warn!(timezone, error = %e, "unknown object key timezone, falling back to UTC");
            Tz::UTC
        });
        Self { tz }
    }

    /// Timezone used for the date segment.
    #[must_use]
    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Generate a fresh key for `ctx` at `now`.
    #[must_use]
    pub fn generate(&self, ctx: &IngestionContext, now: DateTime<Utc>) -> String {
        self.generate_with_id(ctx, now, Uuid::new_v4())
    }

    fn generate_with_id(&self, ctx: &IngestionContext, now: DateTime<Utc>, id: Uuid) -> String {
        let timestamp = now.with_timezone(&self.tz).format(TIMESTAMP_FORMAT);
        format!(
            "{KEY_PREFIX}/{}/{}/{timestamp}/{}_{id}.json",
            ctx.domain().replace(':', "_"),
            ctx.action(),
            ctx.transaction_id(),
        )
    }
}
