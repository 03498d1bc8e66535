//! Concrete [`Embedder`] backends.

use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::config::{EmbedderKind, EmbedderSettings};
use crate::embeddings::Embedder;

pub mod hashing;
pub mod openai;

pub use hashing::HashingEmbedder;
pub use openai::OpenAiEmbedder;

/// Builds the embedder selected in `settings`.
pub fn build_embedder(settings: &EmbedderSettings) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match settings.kind {
        EmbedderKind::Hashing => Arc::new(HashingEmbedder::new(settings.dimensions)?),
        EmbedderKind::Openai => {
            let key = settings.api_key.as_deref().ok_or_else(|| {
                anyhow!("RAGBOT_EMBEDDING_API_KEY or OPENAI_API_KEY must be set for the openai embedder")
            })?;
            Arc::new(OpenAiEmbedder::new(
                key,
                &settings.base_url,
                settings.model.clone(),
                settings.dimensions,
                settings.timeout,
                settings.batch_size,
            )?)
        }
    };
    Ok(embedder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn settings(kind: EmbedderKind, api_key: Option<&str>) -> EmbedderSettings {
        EmbedderSettings {
            kind,
            model: "text-embedding-3-small".to_string(),
            dimensions: 32,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: api_key.map(str::to_string),
            timeout: Duration::from_secs(5),
            batch_size: 8,
        }
    }

    #[test]
    fn hashing_needs_no_key() {
        let embedder = build_embedder(&settings(EmbedderKind::Hashing, None)).expect("embedder");
        assert_eq!(embedder.dimensions(), 32);
        assert_eq!(embedder.model_id(), "hashing-crc32-32");
    }

    #[test]
    fn remote_embedder_requires_key() {
        let err = build_embedder(&settings(EmbedderKind::Openai, None))
            .err()
            .expect("missing key");
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
