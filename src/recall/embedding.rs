//! Embedding collaborator contract and the deterministic fallback.
//!
//! The real embedding service is external and may fail; the fallback hashes
//! token content into a fixed 384-dimensional unit vector so the recall
//! index keeps working offline. Identical text always produces the
//! identical vector.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::CoreError;

/// Dimension of the deterministic fallback embedding.
pub const FALLBACK_DIMENSIONS: usize = 384;

/// External embedding provider. May suspend and may fail; callers fall back
/// to [`fallback_embedding`] on error.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError>;
    fn dimensions(&self) -> usize;
}

/// Deterministic hash embedding: each lowercase token scatters hashed mass
/// into the vector, then the result is normalised to unit length.
pub fn fallback_embedding(text: &str) -> Vec<f32> {
    let mut acc = vec![0.0f64; FALLBACK_DIMENSIONS];

    let mut scatter = |token: &str, weight: f64| {
        let digest = Sha256::digest(token.as_bytes());
        // Eight (index, value) pairs per token from the 32 digest bytes.
        for chunk in digest.chunks_exact(4) {
            let idx = u16::from_le_bytes([chunk[0], chunk[1]]) as usize % FALLBACK_DIMENSIONS;
            let val = (chunk[2] as f64 - 127.5) / 127.5;
            acc[idx] += weight * val;
        }
    };

    let lower = text.to_lowercase();
    for token in lower.split_whitespace() {
        scatter(token, 1.0);
    }
    // Whole-text hash keeps distinct token orderings distinct and gives
    // empty/whitespace-only input a well-defined non-zero vector.
    scatter(&lower, 0.5);

    let norm: f64 = acc.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm == 0.0 {
        // A zero accumulation is only reachable through hash coincidence;
        // fall back to a fixed basis vector so the result stays unit-norm.
        let mut unit = vec![0.0f32; FALLBACK_DIMENSIONS];
        unit[0] = 1.0;
        return unit;
    }
    acc.into_iter().map(|v| (v / norm) as f32).collect()
}

/// Cosine similarity over equal-length, non-zero vectors; 0 otherwise.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += *x as f64 * *y as f64;
        norm_a += (*x as f64).powi(2);
        norm_b += (*y as f64).powi(2);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_is_unit_norm() {
        for text in ["hello world", "", "   ", "a single token", "ラスト"] {
            let v = fallback_embedding(text);
            assert_eq!(v.len(), FALLBACK_DIMENSIONS);
            let norm: f64 = v.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4, "text={text:?} norm={norm}");
        }
    }

    #[test]
    fn identical_text_is_identical() {
        assert_eq!(
            fallback_embedding("the same sentence"),
            fallback_embedding("the same sentence")
        );
    }

    #[test]
    fn different_text_diverges() {
        let a = fallback_embedding("deploy the staging cluster");
        let b = fallback_embedding("bake a chocolate cake");
        assert!(cosine_similarity(&a, &b) < 0.9);
        assert_ne!(a, b);
    }

    #[test]
    fn shared_tokens_raise_similarity() {
        let a = fallback_embedding("deploy the staging cluster");
        let b = fallback_embedding("deploy the staging cluster now");
        let c = fallback_embedding("unrelated words entirely here");
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }

    #[test]
    fn cosine_edge_cases_are_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = fallback_embedding("stable");
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }
}
