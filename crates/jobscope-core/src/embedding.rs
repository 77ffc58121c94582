//! Text encoder trait and vector utilities.
//!
//! Defines the [`TextEncoder`] trait that all encoder backends implement,
//! plus pure helper functions for vector serialization, normalization and
//! similarity computation.
//!
//! Concrete encoders (feature hashing, OpenAI, Ollama, fastembed) live in
//! the `jobscope` app crate.

use async_trait::async_trait;

/// Trait for text encoders.
///
/// Implementations must be deterministic for a fixed model: the same text
/// always yields the same vector. Output does not have to be unit-norm;
/// the app-side adapter normalizes and validates it.
#[async_trait]
pub trait TextEncoder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;
    /// Encode one text into a vector of length [`dims`](Self::dims).
    async fn encode(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// Encode a float vector as little-endian f32 bytes.
///
/// # Example
///
/// ```rust
/// use jobscope_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode bytes produced by [`vec_to_blob`]. Trailing bytes that do not
/// form a whole `f32` are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Inner product. For unit vectors this equals cosine similarity.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Scale `v` to unit length in place. Returns `false` (leaving `v`
/// untouched) when the norm is zero or not finite.
pub fn l2_normalize(v: &mut [f32]) -> bool {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if !norm.is_finite() || norm < f32::EPSILON {
        return false;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    true
}

/// The designated vector used when a text cannot be encoded: `1/sqrt(D)`
/// in every component.
pub fn fallback_vector(dims: usize) -> Vec<f32> {
    if dims == 0 {
        return Vec::new();
    }
    vec![1.0 / (dims as f32).sqrt(); dims]
}

/// True when every component is finite.
pub fn is_finite(v: &[f32]) -> bool {
    v.iter().all(|x| x.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_normalized_dot_is_cosine() {
        let mut a = vec![3.0, 4.0];
        let mut b = vec![1.0, 2.0];
        let cos = dot(&a, &b) / (5.0 * 5.0f32.sqrt());
        assert!(l2_normalize(&mut a));
        assert!(l2_normalize(&mut b));
        assert!((dot(&a, &b) - cos).abs() < 1e-6);
        assert!((a[0] - 0.6).abs() < 1e-6);
        assert!((dot(&a, &[0.8, -0.6])).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_rejects_zero() {
        let mut z = vec![0.0, 0.0];
        assert!(!l2_normalize(&mut z));
    }

    #[test]
    fn test_fallback_is_unit() {
        let v = fallback_vector(16);
        assert!((dot(&v, &v) - 1.0).abs() < 1e-5);
        assert!(fallback_vector(0).is_empty());
    }
}
