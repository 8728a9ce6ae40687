use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::record::{ConfigRecord, VersionToken};

#[derive(Error, Debug)]
pub enum StoreError {
    /// The device itself is unknown to the store.
    #[error("device not found")]
    NotFound,
    /// The compare-and-swap lost against a concurrent writer.
    #[error("version token mismatch")]
    VersionMismatch,
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Versioned key-value contract the engine consumes.
///
/// The engine never reasons about persistence internals; it needs exactly
/// three things from a backend: load the current record with its token, write
/// through a single atomic compare-and-swap, and replace with defaults. The
/// CAS must be one atomic operation at the storage layer: a read-then-write
/// split loses updates between the token check and the write, since
/// concurrent callers may live in separate processes.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load the record for a device.
    ///
    /// `Ok(None)` means the device exists but carries no record yet (callers
    /// typically create defaults lazily); `Err(StoreError::NotFound)` means
    /// the device itself is unknown.
    async fn load(&self, device_id: i64) -> Result<Option<ConfigRecord>, StoreError>;

    /// Atomically replace the record's fields if its live token still equals
    /// `expected`. Advances the token on success and returns the new record.
    async fn compare_and_swap(
        &self,
        device_id: i64,
        expected: VersionToken,
        fields: Map<String, Value>,
    ) -> Result<ConfigRecord, StoreError>;

    /// Unconditionally replace the record with the supplied default fields,
    /// creating it if absent. Preserves `created_at` for an existing record
    /// and always mints a fresh token.
    async fn reset_to_default(
        &self,
        device_id: i64,
        defaults: Map<String, Value>,
    ) -> Result<ConfigRecord, StoreError>;
}
