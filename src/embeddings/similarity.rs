//! Similarity metrics for dense and sparse vectors

use super::SparseVector;

/// Compute cosine similarity between two embedding vectors
///
/// Returns a value between -1.0 and 1.0, where:
/// - 1.0 = identical vectors
/// - 0.0 = orthogonal vectors (or either vector is all zeros)
/// - -1.0 = opposite vectors
///
/// Callers check dimensions first; mismatched lengths only compare the
/// overlapping prefix.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(
        a.len(),
        b.len(),
        "Vectors must have same dimension: {} vs {}",
        a.len(),
        b.len()
    );

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    // Handle zero magnitude case
    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

/// Dot product of two sparse vectors, with an optional per-index weight
///
/// Both vectors must have strictly increasing indices (merge walk).
pub fn sparse_dot(a: &SparseVector, b: &SparseVector, weight: impl Fn(u32) -> f32) -> f32 {
    let (mut i, mut j) = (0, 0);
    let mut total = 0.0;

    while i < a.indices.len() && j < b.indices.len() {
        match a.indices[i].cmp(&b.indices[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                let idx = a.indices[i];
                total += a.values[i] * b.values[j] * weight(idx);
                i += 1;
                j += 1;
            }
        }
    }

    total
}
