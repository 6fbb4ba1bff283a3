// Copyright 2025 Recollect Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Similarity kernel
//!
//! Cosine similarity used in every comparison loop of the memory layer.
//! The kernel is total: malformed input (missing vectors, mismatched
//! dimensions, zero norms, non-finite values) scores `0.0` instead of
//! failing, so a single corrupt row never aborts a scan.

/// Cosine similarity between two vectors.
///
/// Returns `0.0` when the lengths differ, either vector is empty, either
/// norm is zero, or the computation is not finite. The result is clamped
/// to `[-1.0, 1.0]`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let sim = dot / (norm_a.sqrt() * norm_b.sqrt());
    if !sim.is_finite() {
        return 0.0;
    }
    sim.clamp(-1.0, 1.0) as f32
}

/// Cosine similarity over optional vectors; a missing side scores `0.0`.
pub fn cosine_similarity_opt(a: Option<&[f32]>, b: Option<&[f32]>) -> f32 {
    match (a, b) {
        (Some(a), Some(b)) => cosine_similarity(a, b),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_identical_vectors() {
        let v = vec![1.0f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[f32::NAN, 1.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[f32::INFINITY, 1.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_optional_inputs() {
        let v = [0.5f32, 0.5];
        assert_eq!(cosine_similarity_opt(None, Some(&v)), 0.0);
        assert_eq!(cosine_similarity_opt(Some(&v), None), 0.0);
        assert!((cosine_similarity_opt(Some(&v), Some(&v)) - 1.0).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn prop_self_similarity_is_one(v in prop::collection::vec(-100.0f32..100.0, 1..64)) {
            prop_assume!(v.iter().any(|x| x.abs() > 1e-3));
            let sim = cosine_similarity(&v, &v);
            prop_assert!((sim - 1.0).abs() < 1e-5);
        }

        #[test]
        fn prop_symmetric_and_bounded(
            a in prop::collection::vec(-10.0f32..10.0, 8),
            b in prop::collection::vec(-10.0f32..10.0, 8),
        ) {
            let ab = cosine_similarity(&a, &b);
            let ba = cosine_similarity(&b, &a);
            prop_assert!((ab - ba).abs() < 1e-6);
            prop_assert!((-1.0..=1.0).contains(&ab));
        }

        #[test]
        fn prop_length_mismatch_is_zero(
            a in prop::collection::vec(-10.0f32..10.0, 1..16),
            extra in 1usize..4,
        ) {
            let mut b = a.clone();
            b.extend(std::iter::repeat(1.0).take(extra));
            prop_assert_eq!(cosine_similarity(&a, &b), 0.0);
        }
    }
}
