// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Schema-driven validation of raw partial-update payloads.
//!
//! Untrusted patches pass through an explicit allowlist before anything
//! touches storage: identity and token fields are dropped silently (the
//! mass-assignment surface), deprecated names are rewritten through the
//! schema's shim, unknown keys are tolerated, and typed fields are checked
//! for shape and bounds. Validation is all-or-nothing: one bad field rejects
//! the whole patch so partial writes never reach the store.
//!
//! # Example
//!
//! ```
//! use config_sync::{Schema, UpdateValidator};
//! use serde_json::json;
//!
//! let validator = UpdateValidator::new(Schema::device_defaults());
//!
//! let raw = json!({
//!     "device_id": 99,             // dropped: immutable identity
//!     "blah_blah_blah": true,      // dropped: unknown key
//!     "network_not_found_timer": 20,
//! });
//! let patch = validator.validate(raw.as_object().unwrap()).unwrap();
//!
//! assert_eq!(patch.len(), 1);
//! assert_eq!(patch.fields()["network_not_found_timer"], json!(20));
//! ```

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::schema::{FieldKind, Schema, ValueTransform};

/// Why a patch was rejected. All variants abort the entire update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A bounded-integer field received a value outside its representable
    /// range, or numeric garbage that cannot be coerced at all.
    #[error("{field} was too big/small")]
    OutOfRange { field: String },

    /// A field received a value of the wrong shape.
    #[error("{field} must be a {expected}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
    },
}

/// A validated, schema-shaped patch ready for the concurrency guard.
///
/// Contains only current-semantics field names; reserved and unknown keys
/// are gone, deprecated names have been rewritten.
#[derive(Debug, Clone, Default)]
pub struct CleanPatch {
    fields: Map<String, Value>,
}

impl CleanPatch {
    /// The surviving field assignments.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Number of business fields this patch touches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Applies the schema's allowlist, shim, typing, and bounds rules to raw input.
#[derive(Debug, Clone)]
pub struct UpdateValidator {
    schema: Schema,
}

impl UpdateValidator {
    #[must_use]
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }

    /// Validate a raw patch into a [`CleanPatch`], or fail with the first
    /// offending field. No partial results: an error means nothing from this
    /// payload may be applied.
    pub fn validate(&self, raw: &Map<String, Value>) -> Result<CleanPatch, ValidationError> {
        let mut clean = CleanPatch::default();

        for (key, value) in raw {
            // 1. Identity and token metadata: silently dropped, not an error.
            if self.schema.is_reserved(key) {
                debug!(field = %key, "dropping reserved field from patch");
                continue;
            }

            // 2. Deprecated names: rewrite through the schema's shim.
            let (key, value) = match self.schema.deprecation_for(key) {
                Some(rule) => {
                    let translated = translate(key, value, rule.write)?;
                    debug!(from = %key, to = %rule.current, "shimming deprecated field");
                    (rule.current.to_string(), translated)
                }
                None => (key.clone(), value.clone()),
            };

            // 3. Unknown keys: tolerated, dropped.
            let Some(spec) = self.schema.spec(&key) else {
                debug!(field = %key, "ignoring unknown field in patch");
                continue;
            };

            // 4/5. Shape and bounds.
            let checked = check_value(&key, &value, spec.kind)?;
            clean.fields.insert(key, checked);
        }

        Ok(clean)
    }
}

/// Apply a deprecation write transform to the incoming value.
fn translate(
    deprecated_key: &str,
    value: &Value,
    transform: ValueTransform,
) -> Result<Value, ValidationError> {
    match (transform, value) {
        (ValueTransform::Identity, v) => Ok(v.clone()),
        (ValueTransform::InvertBool, Value::Bool(b)) => Ok(Value::Bool(transform.apply(*b))),
        (ValueTransform::InvertBool, _) => Err(ValidationError::TypeMismatch {
            field: deprecated_key.to_string(),
            expected: "boolean",
        }),
    }
}

/// Check one value against its declared kind.
fn check_value(key: &str, value: &Value, kind: FieldKind) -> Result<Value, ValidationError> {
    match kind {
        FieldKind::Bool => match value {
            Value::Bool(_) => Ok(value.clone()),
            _ => Err(ValidationError::TypeMismatch {
                field: key.to_string(),
                expected: "boolean",
            }),
        },
        FieldKind::BoundedInt { min, max } => match value {
            Value::Null => Ok(Value::Null),
            Value::Number(n) => match n.as_i64() {
                // Fits the machine integer and the declared bounds.
                Some(v) if v >= min && v <= max => Ok(value.clone()),
                // Out of declared bounds, wider than i64, or fractional:
                // all overflow, never wrapped to an unrelated value.
                _ => Err(ValidationError::OutOfRange {
                    field: key.to_string(),
                }),
            },
            _ => Err(ValidationError::OutOfRange {
                field: key.to_string(),
            }),
        },
        FieldKind::NullableString => match value {
            Value::Null | Value::String(_) => Ok(value.clone()),
            _ => Err(ValidationError::TypeMismatch {
                field: key.to_string(),
                expected: "string",
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> UpdateValidator {
        UpdateValidator::new(Schema::device_defaults())
    }

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_accepts_typed_fields() {
        let patch = validator()
            .validate(&obj(json!({
                "os_auto_update": false,
                "network_not_found_timer": 20,
                "firmware_hardware": "arduino",
            })))
            .unwrap();

        assert_eq!(patch.len(), 3);
        assert_eq!(patch.fields()["os_auto_update"], json!(false));
        assert_eq!(patch.fields()["network_not_found_timer"], json!(20));
        assert_eq!(patch.fields()["firmware_hardware"], json!("arduino"));
    }

    #[test]
    fn test_drops_device_id_silently() {
        let patch = validator()
            .validate(&obj(json!({"device_id": 99, "os_auto_update": true})))
            .unwrap();

        assert_eq!(patch.len(), 1);
        assert!(!patch.fields().contains_key("device_id"));
    }

    #[test]
    fn test_drops_token_fields_silently() {
        let patch = validator()
            .validate(&obj(json!({"updated_at": 12345, "created_at": 1})))
            .unwrap();

        assert!(patch.is_empty());
    }

    #[test]
    fn test_ignores_unknown_keys() {
        let patch = validator()
            .validate(&obj(json!({"blah_blah_blah": true})))
            .unwrap();

        assert!(patch.is_empty());
    }

    #[test]
    fn test_overflow_rejected_with_field_name() {
        // 24 digits: far outside any machine integer.
        let raw: Map<String, Value> =
            serde_json::from_str(r#"{"network_not_found_timer": 123456789013333333332345}"#)
                .unwrap();
        let err = validator().validate(&raw).unwrap_err();

        assert_eq!(
            err,
            ValidationError::OutOfRange {
                field: "network_not_found_timer".into()
            }
        );
        assert!(err.to_string().contains("network_not_found_timer"));
        assert!(err.to_string().contains("was too big/small"));
    }

    #[test]
    fn test_out_of_declared_bounds_rejected() {
        let err = validator()
            .validate(&obj(json!({"network_not_found_timer": (i32::MAX as i64 + 1)})))
            .unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { .. }));

        let err = validator()
            .validate(&obj(json!({"network_not_found_timer": (i32::MIN as i64 - 1)})))
            .unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { .. }));
    }

    #[test]
    fn test_fractional_and_garbage_integers_rejected() {
        let err = validator()
            .validate(&obj(json!({"network_not_found_timer": 1.5})))
            .unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { .. }));

        let err = validator()
            .validate(&obj(json!({"network_not_found_timer": "twenty"})))
            .unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { .. }));
    }

    #[test]
    fn test_null_clears_nullable_fields() {
        let patch = validator()
            .validate(&obj(json!({
                "network_not_found_timer": null,
                "firmware_path": null,
            })))
            .unwrap();

        assert_eq!(patch.fields()["network_not_found_timer"], Value::Null);
        assert_eq!(patch.fields()["firmware_path"], Value::Null);
    }

    #[test]
    fn test_type_mismatch_on_flags_and_strings() {
        let err = validator()
            .validate(&obj(json!({"os_auto_update": "yes"})))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::TypeMismatch {
                field: "os_auto_update".into(),
                expected: "boolean"
            }
        );

        let err = validator()
            .validate(&obj(json!({"firmware_hardware": 3})))
            .unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { .. }));
    }

    #[test]
    fn test_all_or_nothing() {
        // One valid field plus one overflow: the whole patch dies.
        let err = validator()
            .validate(&obj(json!({
                "os_auto_update": false,
                "network_not_found_timer": 99999999999i64,
            })))
            .unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { .. }));
    }

    #[test]
    fn test_deprecated_flag_rewritten_with_inversion() {
        let patch = validator()
            .validate(&obj(json!({"disable_factory_reset": false})))
            .unwrap();

        assert_eq!(patch.len(), 1);
        assert!(!patch.fields().contains_key("disable_factory_reset"));
        assert_eq!(patch.fields()["auto_factory_reset"], json!(true));
    }

    #[test]
    fn test_deprecated_flag_wrong_shape() {
        let err = validator()
            .validate(&obj(json!({"disable_factory_reset": 23})))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::TypeMismatch {
                field: "disable_factory_reset".into(),
                expected: "boolean"
            }
        );
    }
}
