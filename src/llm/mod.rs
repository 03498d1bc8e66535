//! Language-model providers used for answer generation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::config::{LlmProviderKind, LlmSettings};
use crate::error::RagError;

mod gemini;
mod openai;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

/// Trait implemented by concrete LLM providers.
pub trait LlmProvider: Send + Sync {
    /// Short provider label used in logs.
    fn name(&self) -> &str;

    /// Sends one prompt and returns the generated text.
    fn answer(&self, request: &ProviderRequest) -> Result<String>;
}

/// Request envelope shared by the various providers.
#[derive(Debug, Clone, Copy)]
pub struct ProviderRequest<'a> {
    /// Fully rendered prompt.
    pub prompt: &'a str,
    /// Sampling temperature.
    pub temperature: f32,
    /// Output token cap.
    pub max_tokens: usize,
}

/// Builds the provider selected in `settings`.
///
/// Fails with [`RagError::MissingCredential`] when the provider's API key is
/// absent or blank.
pub fn build_provider(settings: &LlmSettings) -> crate::error::Result<Arc<dyn LlmProvider>> {
    let variable = settings.provider.credential_variable();
    let key = settings
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or(RagError::MissingCredential { variable })?;
    let timeout = Duration::from_secs(settings.timeout_secs.max(1));
    let provider: Arc<dyn LlmProvider> = match settings.provider {
        LlmProviderKind::Gemini => Arc::new(
            GeminiProvider::new(key, settings.model.clone(), timeout)
                .map_err(|err| RagError::Generation(format!("{err:#}")))?,
        ),
        LlmProviderKind::Openai => Arc::new(
            OpenAiProvider::new(key, settings.model.clone(), timeout)
                .map_err(|err| RagError::Generation(format!("{err:#}")))?,
        ),
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(provider: LlmProviderKind, api_key: Option<&str>) -> LlmSettings {
        LlmSettings {
            provider,
            model: "gemini-1.5-flash".to_string(),
            api_key: api_key.map(str::to_string),
            temperature: 0.7,
            max_output_tokens: 1024,
            timeout_secs: 5,
        }
    }

    #[test]
    fn missing_google_key_names_the_variable() {
        let err = build_provider(&settings(LlmProviderKind::Gemini, None))
            .err()
            .expect("missing key rejected");
        assert!(matches!(
            err,
            RagError::MissingCredential {
                variable: "GOOGLE_API_KEY"
            }
        ));
        assert_eq!(err.to_string(), "GOOGLE_API_KEY is not configured");
    }

    #[test]
    fn blank_openai_key_is_missing() {
        let err = build_provider(&settings(LlmProviderKind::Openai, Some("   ")))
            .err()
            .expect("blank key rejected");
        assert!(matches!(
            err,
            RagError::MissingCredential {
                variable: "OPENAI_API_KEY"
            }
        ));
    }

    #[test]
    fn builds_gemini_with_key() {
        let provider = build_provider(&settings(LlmProviderKind::Gemini, Some("g-key")))
            .expect("provider");
        assert_eq!(provider.name(), "gemini");
    }
}
