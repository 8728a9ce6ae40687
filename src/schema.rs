// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Declarative field schema for device configuration records.
//!
//! The schema is pure data: per-field semantic type, numeric bounds, default
//! value, plus the reserved-key list and deprecation mappings the validator
//! applies uniformly. Malformed schemas are a programming error caught at
//! construction, never a runtime condition.
//!
//! # Example
//!
//! ```
//! use config_sync::{Schema, FieldKind};
//!
//! let schema = Schema::device_defaults();
//!
//! // Bounded integers declare their representable range up front.
//! match schema.spec("network_not_found_timer").unwrap().kind {
//!     FieldKind::BoundedInt { min, max } => {
//!         assert_eq!(min, i32::MIN as i64);
//!         assert_eq!(max, i32::MAX as i64);
//!     }
//!     _ => unreachable!(),
//! }
//!
//! // Identity and token fields are reserved, never patchable.
//! assert!(schema.is_reserved("device_id"));
//! assert!(schema.is_reserved("updated_at"));
//!
//! // Deprecated names resolve to their current-semantics replacement.
//! let rule = schema.deprecation_for("disable_factory_reset").unwrap();
//! assert_eq!(rule.current, "auto_factory_reset");
//! ```

use serde_json::{json, Map, Value};

/// Semantic type of a configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// On/off flag.
    Bool,
    /// Integer constrained to `min..=max`; writes outside the range are
    /// rejected as overflow, never wrapped or truncated.
    BoundedInt { min: i64, max: i64 },
    /// Free-form string that may be unset (`null`).
    NullableString,
}

/// Per-field declaration: type plus default value.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub key: &'static str,
    pub kind: FieldKind,
    pub default: Value,
}

/// How a deprecated value is rewritten when crossing the compatibility shim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueTransform {
    /// Carry the value through unchanged.
    Identity,
    /// Flip a boolean (old and new names disagree on polarity).
    InvertBool,
}

impl ValueTransform {
    /// Apply the transform to a boolean.
    #[must_use]
    pub fn apply(self, value: bool) -> bool {
        match self {
            ValueTransform::Identity => value,
            ValueTransform::InvertBool => !value,
        }
    }
}

/// Bidirectional mapping between a retired field name and its replacement.
///
/// `write` rewrites a legacy client's patch value into current semantics;
/// `read` synthesizes the legacy view from the stored current value so old
/// readers keep observing what they expect.
#[derive(Debug, Clone)]
pub struct DeprecationRule {
    pub deprecated: &'static str,
    pub current: &'static str,
    pub write: ValueTransform,
    pub read: ValueTransform,
}

/// The full field table for one record shape.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<FieldSpec>,
    reserved: Vec<&'static str>,
    deprecations: Vec<DeprecationRule>,
}

impl Schema {
    /// Build a schema from explicit parts.
    #[must_use]
    pub fn new(
        fields: Vec<FieldSpec>,
        reserved: Vec<&'static str>,
        deprecations: Vec<DeprecationRule>,
    ) -> Self {
        Self {
            fields,
            reserved,
            deprecations,
        }
    }

    /// The stock firmware/OS config schema.
    ///
    /// Flags default off except the auto-update and auto-factory-reset
    /// behaviors, which ship enabled; the timer and hardware identity fields
    /// start unset.
    #[must_use]
    pub fn device_defaults() -> Self {
        let int32 = FieldKind::BoundedInt {
            min: i32::MIN as i64,
            max: i32::MAX as i64,
        };
        Self::new(
            vec![
                FieldSpec {
                    key: "os_auto_update",
                    kind: FieldKind::Bool,
                    default: json!(true),
                },
                FieldSpec {
                    key: "auto_factory_reset",
                    kind: FieldKind::Bool,
                    default: json!(true),
                },
                FieldSpec {
                    key: "firmware_input_log",
                    kind: FieldKind::Bool,
                    default: json!(false),
                },
                FieldSpec {
                    key: "firmware_output_log",
                    kind: FieldKind::Bool,
                    default: json!(false),
                },
                FieldSpec {
                    key: "sequence_body_log",
                    kind: FieldKind::Bool,
                    default: json!(false),
                },
                FieldSpec {
                    key: "sequence_complete_log",
                    kind: FieldKind::Bool,
                    default: json!(false),
                },
                FieldSpec {
                    key: "sequence_init_log",
                    kind: FieldKind::Bool,
                    default: json!(false),
                },
                FieldSpec {
                    key: "arduino_debug_messages",
                    kind: FieldKind::Bool,
                    default: json!(false),
                },
                FieldSpec {
                    key: "network_not_found_timer",
                    kind: int32,
                    default: Value::Null,
                },
                FieldSpec {
                    key: "firmware_hardware",
                    kind: FieldKind::NullableString,
                    default: Value::Null,
                },
                FieldSpec {
                    key: "firmware_path",
                    kind: FieldKind::NullableString,
                    default: Value::Null,
                },
            ],
            vec!["device_id", "created_at", "updated_at"],
            vec![DeprecationRule {
                deprecated: "disable_factory_reset",
                current: "auto_factory_reset",
                write: ValueTransform::InvertBool,
                read: ValueTransform::Identity,
            }],
        )
    }

    /// Look up a field declaration by current name.
    #[must_use]
    pub fn spec(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Whether the key is identity/token metadata, off-limits to patches.
    #[must_use]
    pub fn is_reserved(&self, key: &str) -> bool {
        self.reserved.iter().any(|r| *r == key)
    }

    /// Look up the deprecation rule for a retired field name.
    #[must_use]
    pub fn deprecation_for(&self, deprecated_key: &str) -> Option<&DeprecationRule> {
        self.deprecations
            .iter()
            .find(|d| d.deprecated == deprecated_key)
    }

    /// Default business fields for a fresh record.
    #[must_use]
    pub fn default_record_fields(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|f| (f.key.to_string(), f.default.clone()))
            .collect()
    }

    /// Synthesize legacy read values for deprecated field names.
    ///
    /// Only touches the map handed in; stored state never contains the
    /// deprecated keys.
    pub fn synthesize_legacy_reads(&self, fields: &mut Map<String, Value>) {
        for rule in &self.deprecations {
            if let Some(current) = fields.get(rule.current).and_then(Value::as_bool) {
                fields.insert(
                    rule.deprecated.to_string(),
                    Value::Bool(rule.read.apply(current)),
                );
            }
        }
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::device_defaults()
    }
}
