// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Firmware version parsing and version-aware flag interpretation.
//!
//! Some flags changed polarity across firmware releases: the same raw stored
//! value means "on" to new firmware and "off" to old firmware. The
//! [`VersionAdapter`] owns those thresholds so presentation code never
//! re-implements the comparison. It is interpretation-only: two clients on
//! different firmware reading the same raw value may legitimately compute
//! opposite effective booleans, and that asymmetry is load-bearing.
//!
//! # Example
//!
//! ```
//! use config_sync::{VersionAdapter, ROTATION_ADJUSTMENT_FLAG};
//!
//! let adapter = VersionAdapter::default();
//!
//! // Above the 1.0.14 threshold the raw value is read directly...
//! assert_eq!(adapter.interpret(ROTATION_ADJUSTMENT_FLAG, "1.0.15", true), true);
//! // ...at or below it the polarity is inverted.
//! assert_eq!(adapter.interpret(ROTATION_ADJUSTMENT_FLAG, "1.0.13", true), false);
//! // Missing or garbage versions assume the latest semantics.
//! assert_eq!(adapter.interpret(ROTATION_ADJUSTMENT_FLAG, "", true), true);
//! ```

use std::collections::HashMap;

/// Flag whose polarity flipped at firmware [`ROTATION_ADJUSTMENT_THRESHOLD`].
pub const ROTATION_ADJUSTMENT_FLAG: &str = "take_photo_disable_rotation_adjustment";

/// Last firmware release that used the inverted polarity for
/// [`ROTATION_ADJUSTMENT_FLAG`].
pub const ROTATION_ADJUSTMENT_THRESHOLD: FirmwareVersion = FirmwareVersion::new(1, 0, 14);

/// Three-component firmware version with total component-wise ordering.
///
/// Missing components parse as `0`, so `"1.2"` orders as `1.2.0`. Comparison
/// is numeric per component, most significant first; equal components compare
/// equal. Never a string comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FirmwareVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl FirmwareVersion {
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a `major.minor.patch` string.
    ///
    /// Accepts an optional leading `v` and up to three dot-separated numeric
    /// components; missing components default to `0`. Returns `None` for
    /// empty or non-numeric input; callers decide what "unknown version"
    /// means (the adapter assumes latest semantics).
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim().trim_start_matches('v');
        if trimmed.is_empty() {
            return None;
        }
        let mut components = [0u32; 3];
        for (i, part) in trimmed.split('.').enumerate() {
            if i >= 3 {
                return None;
            }
            components[i] = part.parse().ok()?;
        }
        Some(Self::new(components[0], components[1], components[2]))
    }
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Per-flag polarity rules keyed by flag name.
///
/// A registered rule means: raw value read **directly** for versions strictly
/// greater than the threshold, **inverted** at or below it. Flags with no
/// rule are always read directly.
#[derive(Debug, Clone)]
pub struct VersionAdapter {
    rules: HashMap<&'static str, FirmwareVersion>,
}

impl VersionAdapter {
    /// An adapter with no rules (every flag reads directly).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Register a polarity threshold for a flag.
    pub fn register(&mut self, flag_key: &'static str, threshold: FirmwareVersion) {
        self.rules.insert(flag_key, threshold);
    }

    /// Compute the effective boolean for a flag as seen by the given firmware.
    ///
    /// `version` is the client's reported firmware version; empty or
    /// unparseable input is treated as "latest" and reads the raw value
    /// directly. Never mutates stored data.
    #[must_use]
    pub fn interpret(&self, flag_key: &str, version: &str, raw: bool) -> bool {
        let direct = match self.rules.get(flag_key) {
            None => true,
            Some(threshold) => match FirmwareVersion::parse(version) {
                None => true,
                Some(v) => v > *threshold,
            },
        };
        if direct {
            raw
        } else {
            !raw
        }
    }
}

impl Default for VersionAdapter {
    /// The stock rule set: the rotation-adjustment flag flipped after 1.0.14.
    fn default() -> Self {
        let mut adapter = Self::empty();
        adapter.register(ROTATION_ADJUSTMENT_FLAG, ROTATION_ADJUSTMENT_THRESHOLD);
        adapter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_version() {
        assert_eq!(FirmwareVersion::parse("1.0.14"), Some(FirmwareVersion::new(1, 0, 14)));
        assert_eq!(FirmwareVersion::parse("v2.3.4"), Some(FirmwareVersion::new(2, 3, 4)));
    }

    #[test]
    fn test_parse_missing_components_are_zero() {
        assert_eq!(FirmwareVersion::parse("1.2"), Some(FirmwareVersion::new(1, 2, 0)));
        assert_eq!(FirmwareVersion::parse("3"), Some(FirmwareVersion::new(3, 0, 0)));
    }

    #[test]
    fn test_parse_garbage() {
        assert_eq!(FirmwareVersion::parse(""), None);
        assert_eq!(FirmwareVersion::parse("   "), None);
        assert_eq!(FirmwareVersion::parse("not.a.version"), None);
        assert_eq!(FirmwareVersion::parse("1.0.14.2"), None);
        assert_eq!(FirmwareVersion::parse("1..3"), None);
    }

    #[test]
    fn test_ordering_is_component_wise() {
        let v = FirmwareVersion::new;
        assert!(v(1, 0, 15) > v(1, 0, 14));
        assert!(v(1, 1, 0) > v(1, 0, 99));
        assert!(v(2, 0, 0) > v(1, 99, 99));
        assert_eq!(v(1, 2, 0), FirmwareVersion::parse("1.2").unwrap());
    }

    #[test]
    fn test_polarity_flips_across_threshold() {
        let adapter = VersionAdapter::default();
        for raw in [true, false] {
            let newer = adapter.interpret(ROTATION_ADJUSTMENT_FLAG, "1.0.15", raw);
            let older = adapter.interpret(ROTATION_ADJUSTMENT_FLAG, "1.0.13", raw);
            assert_eq!(newer, raw);
            assert_eq!(older, !raw);
            assert_ne!(newer, older);
        }
    }

    #[test]
    fn test_threshold_itself_uses_old_polarity() {
        let adapter = VersionAdapter::default();
        assert_eq!(adapter.interpret(ROTATION_ADJUSTMENT_FLAG, "1.0.14", true), false);
    }

    #[test]
    fn test_unknown_version_assumes_latest() {
        let adapter = VersionAdapter::default();
        assert_eq!(adapter.interpret(ROTATION_ADJUSTMENT_FLAG, "", true), true);
        assert_eq!(adapter.interpret(ROTATION_ADJUSTMENT_FLAG, "garbage", false), false);
    }

    #[test]
    fn test_unregistered_flag_reads_directly() {
        let adapter = VersionAdapter::default();
        assert_eq!(adapter.interpret("some_other_flag", "0.0.1", true), true);
    }

    #[test]
    fn test_display() {
        assert_eq!(FirmwareVersion::new(1, 0, 14).to_string(), "1.0.14");
    }
}
