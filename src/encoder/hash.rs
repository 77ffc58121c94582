//! Offline feature-hashing encoder.
//!
//! Folds and tokenizes text, then hashes unigrams (weight 1.0) and adjacent
//! bigrams (weight 0.5) into `dims` buckets with FNV-1a. One hash bit picks
//! the sign so unrelated features cancel rather than pile up. Identical text
//! always yields the identical vector, and texts sharing vocabulary have
//! positive cosine similarity.

use anyhow::Result;
use async_trait::async_trait;
use jobscope_core::embedding::{l2_normalize, TextEncoder};
use jobscope_core::text;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    })
}

pub struct HashEncoder {
    dims: usize,
    model: String,
}

impl HashEncoder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            model: format!("fnv1a-hash-{dims}"),
        }
    }

    fn bump(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = fnv1a(feature.as_bytes());
        let bucket = (hash % self.dims as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }

    /// Synchronous encoding; the async trait method delegates here.
    pub fn encode_sync(&self, input: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        if self.dims == 0 {
            return vector;
        }
        let tokens = text::tokens(input);
        for token in &tokens {
            self.bump(&mut vector, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.bump(&mut vector, &format!("{} {}", pair[0], pair[1]), 0.5);
        }
        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl TextEncoder for HashEncoder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn encode(&self, input: &str) -> Result<Vec<f32>> {
        Ok(self.encode_sync(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobscope_core::embedding::dot;

    #[test]
    fn test_deterministic_and_unit_norm() {
        let enc = HashEncoder::new(128);
        let a = enc.encode_sync("Senior Rust engineer, Casablanca");
        let b = enc.encode_sync("Senior Rust engineer, Casablanca");
        assert_eq!(a, b);
        assert!((dot(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_case_and_accents_do_not_matter() {
        let enc = HashEncoder::new(128);
        assert_eq!(
            enc.encode_sync("Ingénieur DevOps"),
            enc.encode_sync("ingenieur devops")
        );
    }

    #[test]
    fn test_shared_vocabulary_is_closer() {
        let enc = HashEncoder::new(384);
        let q = enc.encode_sync("backend engineer rust apis");
        let near = enc.encode_sync("backend engineer building rust apis");
        let far = enc.encode_sync("pastry chef bakery croissants");
        assert!(dot(&q, &near) > dot(&q, &far));
        assert!(dot(&q, &near) > 0.5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let enc = HashEncoder::new(16);
        assert!(enc.encode_sync("").iter().all(|x| *x == 0.0));
    }
}
