//! Embedding gateway implementations.
//!
//! - **[`DisabledGateway`]**: fails every call; used when embeddings are not configured.
//! - **[`OpenAiGateway`]**: calls an OpenAI-compatible `POST /embeddings` endpoint
//!   with retry and backoff (see [`crate::openai`]).
//!
//! Use [`create_gateway`] to pick one from configuration:
//!
//! ```rust,no_run
//! # use wiki_kb::config::EmbeddingConfig;
//! # use wiki_kb::embedding::create_gateway;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let gateway = create_gateway(&config).unwrap();
//! assert_eq!(gateway.model_name(), "disabled");
//! ```

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use wiki_kb_core::embedding::{EmbedError, EmbeddingGateway};

use crate::config::EmbeddingConfig;
use crate::openai::{ApiError, OpenAiClient};

impl From<ApiError> for EmbedError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::MissingApiKey(var) => EmbedError::MissingApiKey(var),
            ApiError::Transport(msg) => EmbedError::Transport(msg),
            ApiError::Status { status, body } => EmbedError::Api { status, body },
            ApiError::Decode(msg) => EmbedError::InvalidResponse(msg),
        }
    }
}

// ============ Disabled Gateway ============

/// Gateway used when `embedding.provider = "disabled"`.
pub struct DisabledGateway;

#[async_trait]
impl EmbeddingGateway for DisabledGateway {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn embed_many(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Err(EmbedError::Disabled)
    }
}

// ============ OpenAI Gateway ============

/// Embedding gateway for OpenAI-compatible APIs.
///
/// Requires the `OPENAI_API_KEY` environment variable. Every returned
/// vector is checked against the configured `dims`.
pub struct OpenAiGateway {
    client: OpenAiClient,
    model: String,
    dims: usize,
}

impl OpenAiGateway {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let client =
            OpenAiClient::from_env(&config.base_url, config.timeout_secs, config.max_retries)?;
        Ok(Self {
            client,
            model,
            dims,
        })
    }
}

#[async_trait]
impl EmbeddingGateway for OpenAiGateway {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
            "encoding_format": "float",
        });
        let json = self.client.post_json("embeddings", &body).await?;
        let vectors = parse_embeddings_response(&json)?;

        if vectors.len() != texts.len() {
            return Err(EmbedError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        if let Some(v) = vectors.iter().find(|v| v.len() != self.dims) {
            return Err(EmbedError::InvalidResponse(format!(
                "expected {} dimensions, got {}",
                self.dims,
                v.len()
            )));
        }
        Ok(vectors)
    }
}

/// Extract `data[].embedding` arrays, ordered by each item's `index`.
fn parse_embeddings_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbedError::InvalidResponse("missing data array".to_string()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| EmbedError::InvalidResponse("missing embedding".to_string()))?;
        let vector = embedding
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| EmbedError::InvalidResponse(format!("non-numeric value {v}")))
            })
            .collect::<Result<Vec<f32>, _>>()?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, vector));
    }

    // Sort by index to ensure order matches input
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// Create the [`EmbeddingGateway`] named by `config.provider`.
///
/// | Config Value | Gateway |
/// |-------------|---------|
/// | `"disabled"` | [`DisabledGateway`] |
/// | `"openai"` | [`OpenAiGateway`] |
pub fn create_gateway(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingGateway>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGateway)),
        "openai" => Ok(Arc::new(OpenAiGateway::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Embed `texts` in batches of `batch_size`, preserving order.
pub async fn embed_in_batches(
    gateway: &dyn EmbeddingGateway,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let mut vectors = Vec::with_capacity(texts.len());
    for (i, batch) in texts.chunks(batch_size.max(1)).enumerate() {
        tracing::debug!(batch = i, size = batch.len(), "embedding batch");
        vectors.extend(gateway.embed_many(batch).await?);
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_parse_sorts_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]},
            ]
        });
        let vectors = parse_embeddings_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_without_index_keeps_order() {
        let json = serde_json::json!({"data": [{"embedding": [0.5]}, {"embedding": [0.25]}]});
        assert_eq!(
            parse_embeddings_response(&json).unwrap(),
            vec![vec![0.5], vec![0.25]]
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let missing = serde_json::json!({"object": "list"});
        assert!(matches!(
            parse_embeddings_response(&missing),
            Err(EmbedError::InvalidResponse(_))
        ));
        let text = serde_json::json!({"data": [{"embedding": ["x"]}]});
        assert!(parse_embeddings_response(&text).is_err());
    }

    #[test]
    fn test_api_error_maps_to_embed_error() {
        let err: EmbedError = ApiError::Status {
            status: 429,
            body: "slow down".into(),
        }
        .into();
        assert!(err.is_transient());
        assert!(matches!(err, EmbedError::Api { status: 429, .. }));
    }

    #[test]
    fn test_create_disabled() {
        let gateway = create_gateway(&EmbeddingConfig::default()).unwrap();
        assert_eq!(gateway.model_name(), "disabled");
    }

    #[tokio::test]
    async fn test_disabled_gateway_fails() {
        let err = DisabledGateway.embed("q").await.unwrap_err();
        assert!(matches!(err, EmbedError::Disabled));
    }

    struct CountingGateway {
        calls: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl EmbeddingGateway for CountingGateway {
        fn model_name(&self) -> &str {
            "counting"
        }

        async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            self.calls.lock().unwrap().push(texts.len());
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }
    }

    #[tokio::test]
    async fn test_embed_in_batches() {
        let gateway = CountingGateway {
            calls: Mutex::new(Vec::new()),
        };
        let texts: Vec<String> = ["a", "bb", "ccc", "dddd", "eeeee"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let vectors = embed_in_batches(&gateway, &texts, 2).await.unwrap();
        assert_eq!(*gateway.calls.lock().unwrap(), vec![2, 2, 1]);
        let lens: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
        assert_eq!(lens, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }
}
