use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{LlmProvider, ProviderRequest};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI chat-completions client.
pub struct OpenAiProvider {
    model: String,
    endpoint: String,
    headers: HeaderMap,
    client: Client,
}

impl OpenAiProvider {
    /// Builds a client for `model` authenticated with `api_key`.
    pub fn new(api_key: &str, model: String, timeout: Duration) -> Result<Self> {
        Self::with_base_url(api_key, model, timeout, OPENAI_BASE_URL)
    }

    /// Same as [`OpenAiProvider::new`] against any OpenAI-compatible API root.
    pub fn with_base_url(
        api_key: &str,
        model: String,
        timeout: Duration,
        base_url: &str,
    ) -> Result<Self> {
        anyhow::ensure!(!model.trim().is_empty(), "missing OpenAI model name");
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
                .context("invalid OpenAI API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build OpenAI HTTP client")?;
        Ok(Self {
            model,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            headers,
            client,
        })
    }
}

impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn answer(&self, request: &ProviderRequest) -> Result<String> {
        let body = CompletionRequest {
            model: &self.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            messages: [PromptMessage {
                role: "user",
                content: request.prompt,
            }],
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .with_context(|| format!("failed to call {}", self.endpoint))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("OpenAI returned {status}: {text}");
        }
        let parsed: CompletionResponse =
            resp.json().context("failed to parse OpenAI response")?;
        extract_answer(parsed)
    }
}

/// First choice's text; a `null` content counts as an empty answer.
fn extract_answer(response: CompletionResponse) -> Result<String> {
    let Some(choice) = response.choices.into_iter().next() else {
        bail!("OpenAI returned no choices");
    };
    if choice.finish_reason.as_deref() == Some("length") {
        warn!("OpenAI answer truncated at max_tokens");
    }
    Ok(choice.message.content.unwrap_or_default())
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: [PromptMessage<'a>; 1],
}

#[derive(Serialize)]
struct PromptMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> CompletionResponse {
        serde_json::from_str(raw).expect("parse")
    }

    #[test]
    fn takes_first_choice_content() {
        let parsed = parse(
            r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"Costs stayed flat."},"finish_reason":"stop"},{"index":1,"message":{"role":"assistant","content":"ignored"}}]}"#,
        );
        assert_eq!(extract_answer(parsed).expect("answer"), "Costs stayed flat.");
    }

    #[test]
    fn null_content_is_an_empty_answer() {
        let parsed = parse(
            r#"{"choices":[{"index":0,"message":{"role":"assistant","content":null},"finish_reason":"content_filter"}]}"#,
        );
        assert_eq!(extract_answer(parsed).expect("answer"), "");
    }

    #[test]
    fn missing_choices_is_an_error() {
        let err = extract_answer(parse(r#"{"choices":[]}"#)).expect_err("no choices");
        assert!(err.to_string().contains("no choices"));
    }

    #[test]
    fn request_wraps_prompt_as_single_user_message() {
        let body = CompletionRequest {
            model: "gpt-4o-mini",
            temperature: 0.2,
            max_tokens: 64,
            messages: [PromptMessage {
                role: "user",
                content: "hi",
            }],
        };
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
        assert_eq!(json["max_tokens"], 64);
    }

    #[test]
    fn endpoint_follows_base_url() {
        let provider = OpenAiProvider::with_base_url(
            "sk-test",
            "gpt-4o-mini".to_string(),
            Duration::from_secs(5),
            "http://localhost:9999/v1/",
        )
        .expect("provider");
        assert_eq!(provider.endpoint, "http://localhost:9999/v1/chat/completions");
    }
}
