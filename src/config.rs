//! Configuration for the sync engine.
//!
//! # Example
//!
//! ```
//! use config_sync::EngineOptions;
//!
//! // Minimal options (uses defaults)
//! let options = EngineOptions::default();
//! assert_eq!(options.lock_field_threshold, 2);
//! assert!(options.legacy_read_shims);
//!
//! // Deserializes from whatever config format the host application uses
//! let options: EngineOptions = serde_json::from_str(
//!     r#"{"sql_url": "sqlite:configs.db", "lock_field_threshold": 3}"#,
//! ).unwrap();
//! assert_eq!(options.sql_url.as_deref(), Some("sqlite:configs.db"));
//! ```

use serde::Deserialize;

/// Tunables for the sync engine. All fields have sensible defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineOptions {
    /// SQLite connection string for the durable store (e.g., "sqlite:configs.db").
    /// `None` when the host wires a store directly.
    #[serde(default)]
    pub sql_url: Option<String>,

    /// Minimum number of business fields in a patch before the optimistic
    /// lock is enforced (default: 2; single-field writes bypass the check).
    #[serde(default = "default_lock_field_threshold")]
    pub lock_field_threshold: usize,

    /// Whether returned records carry synthesized values for deprecated
    /// field names (default: true; disable only when no legacy clients remain).
    #[serde(default = "default_legacy_read_shims")]
    pub legacy_read_shims: bool,
}

fn default_lock_field_threshold() -> usize {
    2
}
fn default_legacy_read_shims() -> bool {
    true
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            sql_url: None,
            lock_field_threshold: default_lock_field_threshold(),
            legacy_read_shims: default_legacy_read_shims(),
        }
    }
}
