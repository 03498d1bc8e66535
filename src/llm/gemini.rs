use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::{LlmProvider, ProviderRequest};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini `generateContent` client.
pub struct GeminiProvider {
    model: String,
    endpoint: String,
    headers: HeaderMap,
    client: Client,
}

impl GeminiProvider {
    /// Builds a client for `model` authenticated with `api_key`.
    pub fn new(api_key: &str, model: String, timeout: Duration) -> Result<Self> {
        Self::with_base_url(api_key, model, timeout, GEMINI_BASE_URL)
    }

    /// Same as [`GeminiProvider::new`] against a custom API root.
    pub fn with_base_url(
        api_key: &str,
        model: String,
        timeout: Duration,
        base_url: &str,
    ) -> Result<Self> {
        anyhow::ensure!(!model.trim().is_empty(), "missing Gemini model name");
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(api_key.trim()).context("invalid Google API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build Gemini HTTP client")?;
        let endpoint = format!(
            "{}/models/{}:generateContent",
            base_url.trim_end_matches('/'),
            model.trim()
        );
        Ok(Self {
            model,
            endpoint,
            headers,
            client,
        })
    }

    /// Model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn answer(&self, request: &ProviderRequest) -> Result<String> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part {
                    text: request.prompt,
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .context("failed to call Gemini generateContent")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("Gemini returned {}: {}", status, text);
        }
        let parsed: GenerateResponse = resp.json().context("failed to parse Gemini response")?;
        extract_text(parsed)
    }
}

fn extract_text(parsed: GenerateResponse) -> Result<String> {
    let Some(candidate) = parsed.candidates.into_iter().next() else {
        let reason = parsed
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason)
            .unwrap_or_else(|| "no candidates".to_string());
        bail!("Gemini produced no answer: {reason}");
    };
    Ok(candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_candidate_parts() {
        let parsed: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Revenue "},{"text":"grew."}],"role":"model"},"finishReason":"STOP"}]}"#,
        )
        .expect("parse");
        assert_eq!(extract_text(parsed).expect("text"), "Revenue grew.");
    }

    #[test]
    fn blocked_prompt_is_an_error() {
        let parsed: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).expect("parse");
        let err = extract_text(parsed).expect_err("blocked");
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn request_uses_camel_case_generation_config() {
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: "hi" }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.5,
                max_output_tokens: 64,
            },
        };
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 64);
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
    }

    #[test]
    fn endpoint_embeds_model_name() {
        let provider = GeminiProvider::with_base_url(
            "key",
            "gemini-1.5-flash".to_string(),
            Duration::from_secs(5),
            "http://localhost:9999/v1beta/",
        )
        .expect("provider");
        assert_eq!(
            provider.endpoint,
            "http://localhost:9999/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }
}
