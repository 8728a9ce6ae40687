//! # config-sync
//!
//! A configuration synchronization engine for fleet devices: one mutable
//! config record per device, safely mutated by untrusted partial updates.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        SyncEngine                           │
//! │  • read / update / reset (the only caller-facing surface)   │
//! │  • lazy default materialization, legacy read synthesis      │
//! └─────────────────────────────────────────────────────────────┘
//!          │                    │                     │
//!          ▼                    ▼                     ▼
//! ┌────────────────┐  ┌──────────────────┐  ┌──────────────────┐
//! │ UpdateValidator│  │ ConcurrencyGuard │  │   ConfigStore    │
//! │ schema typing, │  │ multi-field lock │  │ load / atomic    │
//! │ bounds, shims, │  │ policy on token  │  │ CAS / reset      │
//! │ allowlist      │  │ equality         │  │ (memory, sqlite) │
//! └────────────────┘  └──────────────────┘  └──────────────────┘
//!          │
//!          ▼
//! ┌────────────────┐        ┌──────────────────────────────────┐
//! │     Schema     │        │          VersionAdapter          │
//! │ field table +  │        │ per-flag polarity thresholds for │
//! │ deprecations   │        │ presentation code (read-only)    │
//! └────────────────┘        └──────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **Mass assignment is a no-op**: identity and token fields in a patch are
//!   dropped silently, never applied, never an error.
//! - **Overflow is rejected, not truncated**: bounded integers outside their
//!   declared range fail the whole patch with a distinguishable error.
//! - **Unknown keys are tolerated** so old and new clients can talk to the
//!   same engine.
//! - **All-or-nothing writes**: a patch either validates completely and lands
//!   through one atomic compare-and-swap, or storage is untouched.
//! - **Deprecated fields keep working**: writes are rewritten to current
//!   semantics, reads synthesize the legacy view back.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use config_sync::{EngineOptions, InMemoryConfigStore, SyncEngine};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(InMemoryConfigStore::with_devices([42]));
//!     let engine = SyncEngine::new(store, EngineOptions::default());
//!
//!     // Reading creates schema defaults on first touch.
//!     let record = engine.read(42).await.unwrap();
//!
//!     // Partial update; the token guards multi-field writes.
//!     let patch = json!({"os_auto_update": false, "firmware_hardware": "arduino"});
//!     let updated = engine
//!         .update(42, patch.as_object().unwrap(), Some(record.updated_at))
//!         .await
//!         .unwrap();
//!     assert_eq!(updated.flag("os_auto_update"), Some(false));
//!
//!     // Delete is reset: the record survives with defaults restored.
//!     let fresh = engine.reset(42).await.unwrap();
//!     assert_eq!(fresh.flag("os_auto_update"), Some(true));
//! }
//! ```
//!
//! ## Modules
//!
//! - [`engine`]: the [`SyncEngine`] orchestrating validation, locking, storage
//! - [`schema`]: declarative field table with bounds, defaults, deprecations
//! - [`validator`]: allowlist pass turning raw payloads into clean patches
//! - [`guard`]: the asymmetric optimistic-lock policy
//! - [`version`]: firmware version ordering and flag polarity interpretation
//! - [`storage`]: the [`ConfigStore`] contract and its backends
//! - [`config`]: engine options

pub mod config;
pub mod engine;
pub mod guard;
pub mod record;
pub mod schema;
pub mod storage;
pub mod validator;
pub mod version;

pub use config::EngineOptions;
pub use engine::{EngineError, SyncEngine};
pub use guard::{ConcurrencyGuard, LockDecision};
pub use record::{ConfigRecord, VersionToken};
pub use schema::{DeprecationRule, FieldKind, FieldSpec, Schema, ValueTransform};
pub use storage::memory::InMemoryConfigStore;
pub use storage::sql::SqliteConfigStore;
pub use storage::traits::{ConfigStore, StoreError};
pub use validator::{CleanPatch, UpdateValidator, ValidationError};
pub use version::{
    FirmwareVersion, VersionAdapter, ROTATION_ADJUSTMENT_FLAG, ROTATION_ADJUSTMENT_THRESHOLD,
};
