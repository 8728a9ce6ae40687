//! Configuration record data structure.
//!
//! The [`ConfigRecord`] is the unit of state the engine synchronizes: one
//! record per device, holding the validated business fields plus the
//! timestamps used for optimistic concurrency.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque optimistic-lock stamp carried by every [`ConfigRecord`].
///
/// Internally an epoch-millisecond timestamp, strictly monotonic per device.
/// Only the storage layer mints new tokens; clients may supply one as the
/// *expected* prior value when updating, never as a writable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(pub i64);

impl VersionToken {
    /// The raw epoch-millisecond value.
    #[must_use]
    pub fn as_millis(self) -> i64 {
        self.0
    }
}

/// One device's configuration state.
///
/// Business fields live in a flat JSON map validated against a
/// [`Schema`](crate::schema::Schema); the struct itself only pins down the
/// identity and concurrency metadata. `device_id` is immutable once the
/// record exists, and `updated_at` doubles as the version token.
///
/// # Example
///
/// ```
/// use config_sync::{ConfigRecord, Schema};
///
/// let schema = Schema::device_defaults();
/// let record = ConfigRecord::from_defaults(42, &schema, 1_700_000_000_000);
///
/// assert_eq!(record.device_id, 42);
/// assert_eq!(record.flag("os_auto_update"), Some(true));
/// assert_eq!(record.integer("network_not_found_timer"), None);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigRecord {
    /// Owning device (immutable identity, never patchable).
    pub device_id: i64,
    /// Creation timestamp (epoch millis).
    pub created_at: i64,
    /// Last-write timestamp (epoch millis), doubling as the optimistic-lock token.
    pub updated_at: VersionToken,
    /// Schema-validated business fields, serialized inline so the wire shape
    /// stays flat for legacy clients.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ConfigRecord {
    /// Build a fresh record from schema defaults.
    #[must_use]
    pub fn from_defaults(device_id: i64, schema: &crate::schema::Schema, now_millis: i64) -> Self {
        Self {
            device_id,
            created_at: now_millis,
            updated_at: VersionToken(now_millis),
            fields: schema.default_record_fields(),
        }
    }

    /// Read a boolean flag. `None` if the field is absent or not a boolean.
    #[must_use]
    pub fn flag(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(Value::as_bool)
    }

    /// Read a bounded-integer field. `None` if absent, `null`, or non-numeric.
    #[must_use]
    pub fn integer(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(Value::as_i64)
    }

    /// Read a nullable string field. `None` if absent or `null`.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Current wall-clock time as epoch millis.
pub(crate) fn epoch_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
