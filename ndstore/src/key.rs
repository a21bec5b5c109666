//! Canonical coordinate keys for the per-dataset image index.
//!
//! Two coordinate tuples map to the same key iff they are element-wise equal
//! and of equal length. The decimal components are joined with `_`, which
//! never occurs inside a decimal digit run, so the encoding is collision-free
//! for any rank and any coordinate magnitude.

use std::fmt::Write;

/// Derives the canonical lookup key for an ordered coordinate tuple.
///
/// `[1, 2, 3]` maps to `"1_2_3"`; the empty tuple maps to `""`.
#[must_use]
pub fn image_key(coordinates: &[usize]) -> String {
    let mut key = String::with_capacity(coordinates.len() * 4);
    for (i, c) in coordinates.iter().enumerate() {
        if i > 0 {
            key.push('_');
        }
        // Writing to a String cannot fail.
        let _ = write!(key, "{c}");
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        assert_eq!(image_key(&[1, 2, 3]), "1_2_3");
        assert_eq!(image_key(&[0]), "0");
        assert_eq!(image_key(&[]), "");
    }

    #[test]
    fn test_key_determinism() {
        assert_eq!(image_key(&[1, 2, 3]), image_key(&[1, 2, 3]));
        assert_ne!(image_key(&[1, 2, 3]), image_key(&[1, 2, 4]));
        assert_ne!(image_key(&[1, 2, 3]), image_key(&[1, 2]));
    }

    #[test]
    fn test_no_cross_rank_collisions() {
        // A tuple must never alias a differently-shaped tuple.
        assert_ne!(image_key(&[12]), image_key(&[1, 2]));
        assert_ne!(image_key(&[1, 23]), image_key(&[12, 3]));
    }

    #[test]
    fn test_large_coordinates() {
        assert_eq!(
            image_key(&[usize::MAX, 0]),
            format!("{}_0", usize::MAX)
        );
    }
}
