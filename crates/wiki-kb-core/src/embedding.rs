//! Embedding gateway trait and vector utilities.
//!
//! Defines the [`EmbeddingGateway`] trait that all embedding backends
//! implement, the [`EmbedError`] they report, and pure helpers for
//! normalization, similarity, and the JSON vector encoding used in
//! persisted knowledge-base files.
//!
//! Concrete gateways (OpenAI-compatible HTTP) live in the `wiki-kb` app
//! crate. The core never retries a failed embedding call.

use async_trait::async_trait;
use thiserror::Error;

/// Norms below this are treated as zero when normalizing.
pub const NORM_EPSILON: f32 = 1e-9;

/// Failure at the embedding boundary.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// Embeddings are not configured.
    #[error("embedding provider is disabled")]
    Disabled,
    /// The API key environment variable is not set.
    #[error("{0} environment variable not set")]
    MissingApiKey(String),
    /// The request never produced an HTTP response.
    #[error("embedding request failed: {0}")]
    Transport(String),
    /// The API answered with a non-success status.
    #[error("embedding API error {status}: {body}")]
    Api { status: u16, body: String },
    /// The response could not be interpreted.
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
}

impl EmbedError {
    /// Whether retrying the same request may succeed (rate limits, server
    /// errors, network failures).
    pub fn is_transient(&self) -> bool {
        match self {
            EmbedError::Transport(_) => true,
            EmbedError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Converts text into fixed-length vectors.
///
/// All vectors returned by one gateway share the same length.
#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embed_many(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::InvalidResponse("empty embedding response".to_string()))
    }
}

/// Euclidean length of `v`.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// `v / max(norm(v), NORM_EPSILON)`.
///
/// A zero vector stays zero, so it scores zero against everything.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm = l2_norm(v).max(NORM_EPSILON);
    v.iter().map(|x| x / norm).collect()
}

/// Dot product over the common prefix of `a` and `b`.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or when
/// either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let denom = l2_norm(a) * l2_norm(b);
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot(a, b) / denom
}

/// Encode a vector as a JSON array string.
///
/// `f32` values are written in shortest round-trip form, so
/// [`decode_vector`] restores them bit for bit.
///
/// # Example
///
/// ```rust
/// use wiki_kb_core::embedding::{encode_vector, decode_vector};
///
/// let v = vec![1.0f32, -2.5, 0.1];
/// let s = encode_vector(&v);
/// assert_eq!(s, "[1.0,-2.5,0.1]");
/// assert_eq!(decode_vector(&s).unwrap(), v);
/// ```
pub fn encode_vector(v: &[f32]) -> String {
    serde_json::to_string(v).unwrap_or_else(|_| "[]".to_string())
}

/// Decode a JSON array string into a vector.
pub fn decode_vector(raw: &str) -> Result<Vec<f32>, serde_json::Error> {
    serde_json::from_str(raw.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedGateway;

    #[async_trait]
    impl EmbeddingGateway for FixedGateway {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_embed_uses_batch_call() {
        let v = FixedGateway.embed("abc").await.unwrap();
        assert_eq!(v, vec![3.0, 1.0]);
    }

    #[test]
    fn test_normalize_unit_length() {
        let n = l2_normalize(&[3.0, 4.0]);
        assert!((n[0] - 0.6).abs() < 1e-6);
        assert!((n[1] - 0.8).abs() < 1e-6);
        assert!((l2_norm(&n) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector_stays_zero() {
        assert_eq!(l2_normalize(&[0.0, 0.0, 0.0]), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_vector_json_round_trip_is_exact() {
        let v = vec![0.1f32, -0.000_123_45, 1e-30, 123_456.79, 0.0];
        let decoded = decode_vector(&encode_vector(&v)).unwrap();
        assert_eq!(
            decoded.iter().map(|x| x.to_bits()).collect::<Vec<_>>(),
            v.iter().map(|x| x.to_bits()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_vector("[1.0, oops]").is_err());
        assert!(decode_vector("").is_err());
    }

    #[test]
    fn test_transient_errors() {
        assert!(EmbedError::Transport("reset".into()).is_transient());
        assert!(EmbedError::Api { status: 429, body: String::new() }.is_transient());
        assert!(EmbedError::Api { status: 503, body: String::new() }.is_transient());
        assert!(!EmbedError::Api { status: 401, body: String::new() }.is_transient());
        assert!(!EmbedError::Disabled.is_transient());
    }
}
