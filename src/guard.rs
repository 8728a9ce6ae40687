// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Optimistic-lock policy for validated patches.
//!
//! The lock is deliberately asymmetric: single-field writes bypass the token
//! check entirely, multi-field writes must present the record's current
//! token. Single-value toggles come from low-stakes callers where a benign
//! race loses nothing; a batch of fields encodes causally dependent changes
//! and must not land on top of state the client never saw. The guard only
//! decides; the store's compare-and-swap is still the final arbiter against
//! concurrent writers.

use tracing::{debug, warn};

use crate::record::VersionToken;
use crate::validator::CleanPatch;

/// Outcome of the lock check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDecision {
    /// Apply the patch (the store's CAS may still lose a race).
    Proceed,
    /// The client's expected token is stale; reject without mutating.
    Conflict,
}

/// Decides whether a patch must pass the optimistic-lock check.
#[derive(Debug, Clone)]
pub struct ConcurrencyGuard {
    /// Minimum number of business fields before the lock is enforced.
    min_fields: usize,
}

impl ConcurrencyGuard {
    /// A guard enforcing the lock for patches touching at least `min_fields`
    /// business fields. The stock policy is 2.
    #[must_use]
    pub fn new(min_fields: usize) -> Self {
        Self { min_fields }
    }

    /// Evaluate a validated patch against the record's live token.
    ///
    /// The patch has already been through the validator, so token and
    /// identity keys are gone and never count toward the field total. A
    /// client that supplies no expected token is never conflicted here; it
    /// simply rides on the CAS.
    #[must_use]
    pub fn evaluate(
        &self,
        patch: &CleanPatch,
        expected: Option<VersionToken>,
        current: VersionToken,
    ) -> LockDecision {
        if patch.len() < self.min_fields {
            debug!(
                fields = patch.len(),
                "single-value write, bypassing optimistic lock"
            );
            return LockDecision::Proceed;
        }

        match expected {
            Some(token) if token != current => {
                warn!(
                    expected = token.as_millis(),
                    current = current.as_millis(),
                    fields = patch.len(),
                    "stale token on multi-field write"
                );
                LockDecision::Conflict
            }
            _ => LockDecision::Proceed,
        }
    }
}

impl Default for ConcurrencyGuard {
    fn default() -> Self {
        Self::new(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use crate::validator::UpdateValidator;
    use serde_json::json;

    fn patch(raw: serde_json::Value) -> CleanPatch {
        UpdateValidator::new(Schema::device_defaults())
            .validate(raw.as_object().unwrap())
            .unwrap()
    }

    #[test]
    fn test_single_field_bypasses_lock() {
        let guard = ConcurrencyGuard::default();
        let p = patch(json!({"network_not_found_timer": 20}));

        let decision = guard.evaluate(&p, Some(VersionToken(1)), VersionToken(999));
        assert_eq!(decision, LockDecision::Proceed);
    }

    #[test]
    fn test_multi_field_with_stale_token_conflicts() {
        let guard = ConcurrencyGuard::default();
        let p = patch(json!({
            "network_not_found_timer": 20,
            "firmware_hardware": "whatever",
        }));

        let decision = guard.evaluate(&p, Some(VersionToken(1)), VersionToken(999));
        assert_eq!(decision, LockDecision::Conflict);
    }

    #[test]
    fn test_multi_field_with_matching_token_proceeds() {
        let guard = ConcurrencyGuard::default();
        let p = patch(json!({
            "network_not_found_timer": 20,
            "firmware_hardware": "whatever",
        }));

        let decision = guard.evaluate(&p, Some(VersionToken(999)), VersionToken(999));
        assert_eq!(decision, LockDecision::Proceed);
    }

    #[test]
    fn test_missing_expected_token_proceeds() {
        let guard = ConcurrencyGuard::default();
        let p = patch(json!({
            "network_not_found_timer": 20,
            "firmware_hardware": "whatever",
        }));

        assert_eq!(guard.evaluate(&p, None, VersionToken(5)), LockDecision::Proceed);
    }

    #[test]
    fn test_token_field_does_not_count() {
        // updated_at is stripped by the validator, so this is a one-field
        // patch and skips the lock even with a stale token.
        let guard = ConcurrencyGuard::default();
        let p = patch(json!({
            "updated_at": 12345,
            "network_not_found_timer": 20,
        }));

        assert_eq!(p.len(), 1);
        let decision = guard.evaluate(&p, Some(VersionToken(1)), VersionToken(999));
        assert_eq!(decision, LockDecision::Proceed);
    }

    #[test]
    fn test_threshold_is_configurable() {
        let guard = ConcurrencyGuard::new(1);
        let p = patch(json!({"network_not_found_timer": 20}));

        let decision = guard.evaluate(&p, Some(VersionToken(1)), VersionToken(999));
        assert_eq!(decision, LockDecision::Conflict);
    }
}
