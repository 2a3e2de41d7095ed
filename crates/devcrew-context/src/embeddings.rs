use async_trait::async_trait;
use sha2::{Digest, Sha256};

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Vec<Vec<f32>>;

    fn dimension(&self) -> usize;
}

/// Deterministic SHA-256-derived 32-dim fallback, used whenever no real
/// embedding provider is configured. This keeps ranking tests hermetic:
/// the same text always yields the same vector with no network call.
pub struct HashEmbeddingProvider;

const DIMENSION: usize = 32;

fn hash_embedding(text: &str) -> Vec<f32> {
    let digest = Sha256::digest(text.as_bytes());
    (0..DIMENSION)
        .map(|i| {
            let offset = (i * 2) % digest.len();
            let hi = digest[offset] as u32;
            let lo = digest[(offset + 1) % digest.len()] as u32;
            let value = (hi << 8) | lo;
            value as f32 / 65535.0
        })
        .collect()
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts.iter().map(|t| hash_embedding(t)).collect()
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_embedding_is_deterministic() {
        let provider = HashEmbeddingProvider;
        let a = provider.embed(&["hello world".to_string()]).await;
        let b = provider.embed(&["hello world".to_string()]).await;
        assert_eq!(a, b);
        assert_eq!(a[0].len(), DIMENSION);
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.5_f32, 0.5, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }
}
