use super::{EmbeddingClient, EmbeddingClientError};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Deterministic feature-hashing embedder.
///
/// Each lowercase alphanumeric token is hashed into a signed bucket and the resulting vector
/// is L2-normalized, so texts sharing vocabulary score high under cosine similarity. Useful
/// offline and in tests; it carries no semantics beyond word overlap.
pub struct HashingEmbeddingClient {
    dimension: usize,
}

impl HashingEmbeddingClient {
    /// Construct a client producing vectors of `dimension` components.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0_u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingClient for HashingEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        tracing::trace!(dimension = self.dimension, count = texts.len(), "Hashing embeddings");
        Ok(texts
            .iter()
            .map(|text| Self::encode(text, self.dimension))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn vectors_are_normalized_and_deterministic() {
        let client = HashingEmbeddingClient::new(64);
        let first = client
            .generate_embeddings(vec!["The capital of France is Paris.".into()])
            .await
            .unwrap();
        let second = client
            .generate_embeddings(vec!["The capital of France is Paris.".into()])
            .await
            .unwrap();
        assert_eq!(first, second);
        let norm: f32 = first[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn shared_vocabulary_scores_higher_than_disjoint_text() {
        let client = HashingEmbeddingClient::new(512);
        let vectors = client
            .generate_embeddings(vec![
                "The capital of France is Paris.".into(),
                "What is the capital of France?".into(),
                "Bananas ripen quickly in warm kitchens".into(),
            ])
            .await
            .unwrap();
        let related = cosine(&vectors[0], &vectors[1]);
        let unrelated = cosine(&vectors[0], &vectors[2]);
        assert!(related > 0.5, "related score {related}");
        assert!(related > unrelated);
    }

    #[tokio::test]
    async fn empty_text_yields_zero_vector() {
        let client = HashingEmbeddingClient::new(8);
        let vectors = client.generate_embeddings(vec!["  ".into()]).await.unwrap();
        assert!(vectors[0].iter().all(|value| *value == 0.0));
    }

    #[tokio::test]
    async fn zero_dimension_is_rejected() {
        let client = HashingEmbeddingClient::new(0);
        let error = client.generate_embeddings(vec!["x".into()]).await;
        assert!(matches!(error, Err(EmbeddingClientError::GenerationFailed(_))));
    }
}
