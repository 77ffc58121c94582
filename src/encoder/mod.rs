//! Text encoder adapter and backend selection.
//!
//! [`Encoder`] wraps any [`TextEncoder`] and owns the rules every backend
//! shares:
//! - input is whitespace-collapsed and truncated to `max_chars`;
//! - text with fewer than `min_tokens` tokens, or text the backend fails
//!   on, gets the designated fallback vector flagged low-confidence;
//! - backend output must have the configured dimension and finite
//!   components, and is scaled to unit norm.
//!
//! # Backends
//!
//! | Config Value | Encoder |
//! |-------------|----------|
//! | `"hash"` | [`HashEncoder`] |
//! | `"openai"` | [`OpenAiEncoder`] |
//! | `"ollama"` | [`OllamaEncoder`] |
//! | `"local"` | `LocalEncoder` (requires `local-embeddings-fastembed`) |

mod hash;
#[cfg(feature = "local-embeddings-fastembed")]
mod local;
mod remote;

use std::sync::Arc;

use anyhow::{bail, Result};
use jobscope_core::embedding::{fallback_vector, is_finite, l2_normalize, TextEncoder};
use jobscope_core::{text, CoreError};
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;

pub use hash::HashEncoder;
#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalEncoder;
pub use remote::{OllamaEncoder, OpenAiEncoder};

/// A vector ready for the index.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    pub vector: Vec<f32>,
    pub low_confidence: bool,
}

#[derive(Clone)]
pub struct Encoder {
    inner: Arc<dyn TextEncoder>,
    dims: usize,
    min_tokens: usize,
    max_chars: usize,
}

impl std::fmt::Debug for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoder")
            .field("model", &self.inner.model_name())
            .field("dims", &self.dims)
            .field("min_tokens", &self.min_tokens)
            .field("max_chars", &self.max_chars)
            .finish()
    }
}

impl Encoder {
    pub fn new(inner: Arc<dyn TextEncoder>, config: &EmbeddingConfig) -> Self {
        Self {
            dims: inner.dims(),
            inner,
            min_tokens: config.min_tokens,
            max_chars: config.max_chars,
        }
    }

    /// Build the backend named in `config` and wrap it.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let inner = create_encoder(config)?;
        if inner.dims() != config.dims {
            bail!(
                "encoder '{}' produces {} dimensions but embedding.dims is {}",
                inner.model_name(),
                inner.dims(),
                config.dims
            );
        }
        Ok(Self::new(inner, config))
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    /// Collapse whitespace and cut to at most `max_chars` characters.
    pub fn prepare(&self, input: &str) -> String {
        let collapsed = text::collapse_whitespace(input);
        match collapsed.char_indices().nth(self.max_chars) {
            Some((cut, _)) => collapsed[..cut].to_string(),
            None => collapsed,
        }
    }

    fn finish(&self, mut vector: Vec<f32>) -> Result<Vec<f32>, CoreError> {
        if vector.len() != self.dims {
            return Err(CoreError::EncodingFailure(format!(
                "encoder returned {} dimensions, expected {}",
                vector.len(),
                self.dims
            )));
        }
        if !is_finite(&vector) {
            return Err(CoreError::EncodingFailure(
                "encoder returned non-finite components".to_string(),
            ));
        }
        if !l2_normalize(&mut vector) {
            return Err(CoreError::EncodingFailure(
                "encoder returned a zero vector".to_string(),
            ));
        }
        Ok(vector)
    }

    fn fallback(&self) -> Encoded {
        Encoded {
            vector: fallback_vector(self.dims),
            low_confidence: true,
        }
    }

    /// Encode a document. Never fails: unusable text and backend failures
    /// yield the fallback vector with `low_confidence` set.
    pub async fn encode(&self, input: &str) -> Encoded {
        let prepared = self.prepare(input);
        let tokens = text::token_count(&prepared);
        if tokens < self.min_tokens {
            debug!(tokens, min = self.min_tokens, "text below minimum length, using fallback");
            return self.fallback();
        }

        let result = match self.inner.encode(&prepared).await {
            Ok(raw) => self.finish(raw),
            Err(e) => Err(CoreError::EncodingFailure(e.to_string())),
        };
        match result {
            Ok(vector) => Encoded {
                vector,
                low_confidence: false,
            },
            Err(e) => {
                warn!(error = %e, model = self.model_name(), "encoding failed, using fallback");
                self.fallback()
            }
        }
    }

    /// Encode a search query. Returns `None` for text with no tokens.
    ///
    /// Unlike [`encode`](Self::encode) there is no fallback: a query vector
    /// that means nothing would rank results arbitrarily.
    pub async fn encode_query(&self, input: &str) -> Result<Option<Vec<f32>>, CoreError> {
        let prepared = self.prepare(input);
        if text::token_count(&prepared) == 0 {
            return Ok(None);
        }
        let raw = self
            .inner
            .encode(&prepared)
            .await
            .map_err(|e| CoreError::EncodingFailure(e.to_string()))?;
        self.finish(raw).map(Some)
    }
}

/// Create the backend named by `config.provider`.
pub fn create_encoder(config: &EmbeddingConfig) -> Result<Arc<dyn TextEncoder>> {
    match config.provider.as_str() {
        "hash" => Ok(Arc::new(HashEncoder::new(config.dims))),
        "openai" => Ok(Arc::new(OpenAiEncoder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEncoder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEncoder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
