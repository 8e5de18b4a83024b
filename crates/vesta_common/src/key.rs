//! Specialization keys identifying one compiled variant.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A half-open range `[min, max)` of expected kernel input values.
///
/// The key is used verbatim as a map key: no normalization is applied, so
/// callers must use one consistent representation for the same range.
/// Ordering is lexicographic on `(min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpecKey {
    min: i64,
    max: i64,
}

/// Error returned when a key would describe an empty or inverted range.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid specialization range [{min}, {max}): min must be below max")]
pub struct InvalidKey {
    /// The rejected lower bound.
    pub min: i64,
    /// The rejected upper bound.
    pub max: i64,
}

impl SpecKey {
    /// Creates a key for `[min, max)`, rejecting `min >= max`.
    pub fn new(min: i64, max: i64) -> Result<Self, InvalidKey> {
        if min < max {
            Ok(Self { min, max })
        } else {
            Err(InvalidKey { min, max })
        }
    }

    /// The inclusive lower bound.
    pub fn lower(&self) -> i64 {
        self.min
    }

    /// The exclusive upper bound.
    pub fn upper(&self) -> i64 {
        self.max
    }

    /// Derives the directory lookup key for a logical function name.
    ///
    /// Producers and consumers compute this independently, so the format
    /// `<name>_<min>_<max>` must never change between versions that are
    /// expected to interoperate.
    pub fn directory_key(&self, function: &str) -> String {
        format!("{function}_{}_{}", self.min, self.max)
    }
}

impl fmt::Display for SpecKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.min, self.max)
    }
}

impl TryFrom<(i64, i64)> for SpecKey {
    type Error = InvalidKey;

    fn try_from((min, max): (i64, i64)) -> Result<Self, Self::Error> {
        Self::new(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordered_bounds() {
        let key = SpecKey::new(-256, 256).unwrap();
        assert_eq!(key.lower(), -256);
        assert_eq!(key.upper(), 256);
    }

    #[test]
    fn rejects_empty_range() {
        let err = SpecKey::new(5, 5).unwrap_err();
        assert_eq!(err, InvalidKey { min: 5, max: 5 });
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(SpecKey::new(10, -10).is_err());
    }

    #[test]
    fn directory_key_format() {
        let key = SpecKey::new(0, 256).unwrap();
        assert_eq!(key.directory_key("vc_sort"), "vc_sort_0_256");
        let neg = SpecKey::new(-1024, 1024).unwrap();
        assert_eq!(neg.directory_key("vc_sort"), "vc_sort_-1024_1024");
    }

    #[test]
    fn ordering_is_min_then_max() {
        let a = SpecKey::new(0, 541).unwrap();
        let b = SpecKey::new(0, 3571).unwrap();
        let c = SpecKey::new(-256, 256).unwrap();
        let mut keys = vec![b, a, c];
        keys.sort();
        assert_eq!(keys, vec![c, a, b]);
    }

    #[test]
    fn display_is_half_open() {
        let key = SpecKey::new(0, 7919).unwrap();
        assert_eq!(key.to_string(), "[0, 7919)");
    }

    #[test]
    fn try_from_tuple() {
        let key: SpecKey = (-512, 512).try_into().unwrap();
        assert_eq!(key, SpecKey::new(-512, 512).unwrap());
    }

    #[test]
    fn invalid_key_display() {
        let err = SpecKey::new(3, 1).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid specialization range [3, 1): min must be below max"
        );
    }
}
