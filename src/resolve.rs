//! Building resolver: match a requested identifier against an artifact map
//!
//! The three artifact producers key their outputs inconsistently (prefixes,
//! zero padding, namespacing), so exact keying alone would silently drop
//! valid matches. The resolver runs a cascade of matching strategies, each
//! step stopping on first hit, with cheap/precise rules strictly before
//! fuzzy scans: an ambiguous substring match can never shadow an exact hit.
//!
//! Worst case is O(n) string scans over the key set, accepted at demo scale
//! (thousands of buildings, not millions).

use crate::ident;

/// Which cascade step produced a match, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchStep {
    /// Raw requested id equals a key
    Exact,
    /// Normalized id equals a key
    Normalized,
    /// A zero-padding variant of the normalized id equals a key
    PaddingVariant,
    /// Variant/key substring containment, or keys equal after normalizing both
    VariantScan,
    /// Normalized id contained in a key or vice versa
    FuzzyContains,
}

/// Resolve a requested identifier against a set of artifact keys.
///
/// Returns the matching key from `keys` (not the requested id) so callers
/// can index back into their map, along with the step that matched.
pub fn resolve<'a>(requested: &str, keys: &[&'a str]) -> Option<(&'a str, MatchStep)> {
    // Step 1: exact match on the raw requested id
    if let Some(k) = keys.iter().copied().find(|&k| k == requested) {
        return Some((k, MatchStep::Exact));
    }

    // Step 2: exact match on the normalized id
    let normalized = ident::normalize(requested);
    if let Some(k) = keys.iter().copied().find(|&k| k == normalized) {
        return Some((k, MatchStep::Normalized));
    }

    // Step 3: zero-padding variants of the normalized id
    let stripped = ident::strip_leading_zeros(&normalized);
    let padded = ident::pad_to_width(&normalized);
    for variant in [stripped.as_str(), padded.as_str()] {
        if let Some(k) = keys.iter().copied().find(|&k| k == variant) {
            return Some((k, MatchStep::PaddingVariant));
        }
    }

    // Step 4: scan all keys against every variant
    let variants = [
        requested,
        normalized.as_str(),
        stripped.as_str(),
        padded.as_str(),
    ];
    for &k in keys {
        for variant in variants {
            if variant == k || k.contains(variant) || variant.contains(k) {
                return Some((k, MatchStep::VariantScan));
            }
        }
        if ident::normalize(k) == normalized {
            return Some((k, MatchStep::VariantScan));
        }
    }

    // Step 5: last-resort containment on the normalized id alone
    for &k in keys {
        if k.contains(normalized.as_str()) || normalized.contains(k) {
            return Some((k, MatchStep::FuzzyContains));
        }
    }

    None
}
