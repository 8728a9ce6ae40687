//! Sync engine orchestrator.
//!
//! The [`SyncEngine`] is the only component other layers call. Each update is
//! one read-validate-CAS-write pass:
//!
//! ```text
//! caller → update(device_id, raw_patch, expected_token)
//!            │
//!            ▼
//!   UpdateValidator  (allowlist, deprecation shim, typing, bounds)
//!            │
//!            ▼
//!   ConcurrencyGuard (multi-field patches must present the live token)
//!            │
//!            ▼
//!   ConfigStore::compare_and_swap  (atomic; the only arbitration point)
//!            │
//!            ▼
//!   record with synthesized legacy read view, or a typed error
//! ```
//!
//! The engine holds no in-process locks and never retries a lost CAS; the
//! loser's caller decides whether to re-read and try again.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use config_sync::{EngineOptions, InMemoryConfigStore, SyncEngine};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = Arc::new(InMemoryConfigStore::with_devices([42]));
//! let engine = SyncEngine::new(store, EngineOptions::default());
//!
//! // First read materializes schema defaults.
//! let record = engine.read(42).await.unwrap();
//!
//! let patch = json!({"network_not_found_timer": 20});
//! let updated = engine
//!     .update(42, patch.as_object().unwrap(), Some(record.updated_at))
//!     .await
//!     .unwrap();
//! assert_eq!(updated.integer("network_not_found_timer"), Some(20));
//! # }
//! ```

use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::EngineOptions;
use crate::guard::{ConcurrencyGuard, LockDecision};
use crate::record::{ConfigRecord, VersionToken};
use crate::schema::Schema;
use crate::storage::traits::{ConfigStore, StoreError};
use crate::validator::{UpdateValidator, ValidationError};
use crate::version::VersionAdapter;

/// Every way an engine operation can fail, distinguishable so a transport
/// layer can map kinds to status codes without string matching.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The patch failed schema validation; nothing was written.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Optimistic-lock conflict: the record changed under the client.
    #[error("config for device {0} was changed by another client")]
    Conflict(i64),

    /// The device is unknown.
    #[error("device {0} not found")]
    NotFound(i64),

    /// Storage plumbing failure unrelated to the request's content.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Orchestrates validation, lock policy, and storage for one record shape.
///
/// Stateless between calls; cheap to share behind an `Arc` across handlers.
pub struct SyncEngine {
    store: Arc<dyn ConfigStore>,
    schema: Schema,
    validator: UpdateValidator,
    guard: ConcurrencyGuard,
    adapter: VersionAdapter,
    legacy_read_shims: bool,
}

impl SyncEngine {
    /// Build an engine over the stock device schema.
    #[must_use]
    pub fn new(store: Arc<dyn ConfigStore>, options: EngineOptions) -> Self {
        Self::with_schema(store, Schema::device_defaults(), options)
    }

    /// Build an engine over a custom schema.
    #[must_use]
    pub fn with_schema(store: Arc<dyn ConfigStore>, schema: Schema, options: EngineOptions) -> Self {
        Self {
            store,
            validator: UpdateValidator::new(schema.clone()),
            guard: ConcurrencyGuard::new(options.lock_field_threshold),
            adapter: VersionAdapter::default(),
            legacy_read_shims: options.legacy_read_shims,
            schema,
        }
    }

    /// The version-aware flag interpreter for presentation code.
    ///
    /// UI and reporting layers must go through this instead of re-implementing
    /// polarity thresholds.
    #[must_use]
    pub fn version_adapter(&self) -> &VersionAdapter {
        &self.adapter
    }

    /// Read the current record, creating schema defaults if none exists yet.
    ///
    /// Never fails for a known device.
    pub async fn read(&self, device_id: i64) -> Result<ConfigRecord, EngineError> {
        let record = self.load_or_default(device_id).await?;
        Ok(self.client_view(record))
    }

    /// Apply a partial update.
    ///
    /// `raw` is untrusted: unknown keys and identity/token fields are dropped
    /// silently, deprecated names are shimmed, and typed fields are bounds-
    /// checked before anything touches storage. `expected` is the version
    /// token the client last saw; it is consulted only for multi-field
    /// patches. A lost CAS surfaces as [`EngineError::Conflict`] with zero
    /// mutation and no in-engine retry.
    pub async fn update(
        &self,
        device_id: i64,
        raw: &Map<String, Value>,
        expected: Option<VersionToken>,
    ) -> Result<ConfigRecord, EngineError> {
        let patch = self.validator.validate(raw)?;
        let record = self.load_or_default(device_id).await?;

        if patch.is_empty() {
            debug!(device_id, "patch reduced to nothing, returning current record");
            return Ok(self.client_view(record));
        }

        if self.guard.evaluate(&patch, expected, record.updated_at) == LockDecision::Conflict {
            return Err(EngineError::Conflict(device_id));
        }

        let mut fields = record.fields.clone();
        for (key, value) in patch.fields() {
            fields.insert(key.clone(), value.clone());
        }

        match self
            .store
            .compare_and_swap(device_id, record.updated_at, fields)
            .await
        {
            Ok(updated) => {
                info!(
                    device_id,
                    fields = patch.len(),
                    token = updated.updated_at.as_millis(),
                    "config updated"
                );
                Ok(self.client_view(updated))
            }
            Err(StoreError::VersionMismatch) => {
                warn!(device_id, "CAS lost to a concurrent writer");
                Err(EngineError::Conflict(device_id))
            }
            Err(other) => Err(map_store_error(other, device_id)),
        }
    }

    /// Replace the record with schema defaults.
    ///
    /// Unconditional: never consults the guard, idempotent, and the record
    /// survives (delete-is-reset, the device keeps exactly one record).
    pub async fn reset(&self, device_id: i64) -> Result<ConfigRecord, EngineError> {
        let record = self
            .store
            .reset_to_default(device_id, self.schema.default_record_fields())
            .await
            .map_err(|e| map_store_error(e, device_id))?;
        info!(device_id, "config reset to defaults");
        Ok(self.client_view(record))
    }

    async fn load_or_default(&self, device_id: i64) -> Result<ConfigRecord, EngineError> {
        match self.store.load(device_id).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => {
                debug!(device_id, "no record yet, materializing defaults");
                self.store
                    .reset_to_default(device_id, self.schema.default_record_fields())
                    .await
                    .map_err(|e| map_store_error(e, device_id))
            }
            Err(e) => Err(map_store_error(e, device_id)),
        }
    }

    /// The record as clients see it: stored state plus synthesized values
    /// for deprecated field names. Never written back.
    fn client_view(&self, mut record: ConfigRecord) -> ConfigRecord {
        if self.legacy_read_shims {
            self.schema.synthesize_legacy_reads(&mut record.fields);
        }
        record
    }
}

fn map_store_error(error: StoreError, device_id: i64) -> EngineError {
    match error {
        StoreError::NotFound => EngineError::NotFound(device_id),
        StoreError::VersionMismatch => EngineError::Conflict(device_id),
        StoreError::Backend(message) => EngineError::Backend(message),
    }
}
