//! OpenAI-compatible embeddings backend.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::embeddings::{l2_normalize, Embedder};
use crate::error::RagError;

/// Blocking embeddings client that talks to `<base_url>/embeddings`.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
    batch_size: usize,
}

impl OpenAiEmbedder {
    /// Builds a new embeddings client. `dimensions` is requested from the
    /// endpoint and checked against every returned vector.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: String,
        dimensions: usize,
        timeout: Duration,
        batch_size: usize,
    ) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing embedding API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing embedding model name");
        anyhow::ensure!(dimensions > 0, "embedding dimensions must be positive");
        let base = Url::parse(base_url.trim_end_matches('/'))
            .with_context(|| format!("invalid embedding base URL {base_url}"))?;
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("invalid embedding API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build embeddings HTTP client")?;
        let endpoint = format!("{}/embeddings", base.as_str().trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            model,
            dimensions,
            batch_size: batch_size.max(1),
        })
    }

    /// Maximum inputs sent per request.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Sends one request and returns raw vectors in input order.
    pub fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        anyhow::ensure!(
            inputs.len() <= self.batch_size,
            "batch of {} exceeds configured max {}",
            inputs.len(),
            self.batch_size
        );
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
            dimensions: Some(self.dimensions),
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .with_context(|| format!("failed to call {}", self.endpoint))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            anyhow::bail!("embeddings request failed ({}): {}", status, body);
        }
        let mut parsed: EmbeddingResponse =
            resp.json().context("failed to parse embedding response")?;
        parsed.data.sort_by_key(|entry| entry.index);
        anyhow::ensure!(
            parsed.data.len() == inputs.len(),
            "endpoint returned {} embeddings for {} inputs",
            parsed.data.len(),
            inputs.len()
        );
        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|entry| entry.embedding).collect();
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimensions) {
            anyhow::bail!(
                "endpoint returned {}-dimensional vectors, expected {}",
                bad.len(),
                self.dimensions
            );
        }
        Ok(vectors)
    }
}

impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, inputs: &[&str]) -> crate::error::Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(self.batch_size) {
            let vectors = self
                .embed_batch(batch)
                .map_err(|err| RagError::Embedding(format!("{err:#}")))?;
            out.extend(vectors);
        }
        for vector in out.iter_mut() {
            l2_normalize(vector);
        }
        Ok(out)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    #[serde(borrow)]
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_key() {
        let err = OpenAiEmbedder::new(
            "  ",
            "https://api.openai.com/v1",
            "text-embedding-3-small".to_string(),
            768,
            Duration::from_secs(5),
            8,
        )
        .err()
        .expect("blank key rejected");
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn endpoint_drops_trailing_slash() {
        let embedder = OpenAiEmbedder::new(
            "sk-test",
            "http://localhost:11434/v1/",
            "nomic-embed-text".to_string(),
            768,
            Duration::from_secs(5),
            0,
        )
        .expect("client");
        assert_eq!(embedder.endpoint, "http://localhost:11434/v1/embeddings");
        assert_eq!(embedder.batch_size(), 1);
        assert!(embedder.embed_batch(&[]).expect("empty batch").is_empty());
    }
}
