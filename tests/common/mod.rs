#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ragbot::config::{EmbedderKind, EmbedderSettings, LlmProviderKind, LlmSettings};
use ragbot::embedder::HashingEmbedder;
use ragbot::llm::{LlmProvider, ProviderRequest};
use ragbot::{AppSettings, ChunkingConfig, DocumentLoader, PageExtractor, RagApp, SearchType};

/// Treats uploads as UTF-8 text with form feeds between pages; bytes starting
/// with `BROKEN` fail like an unreadable PDF.
pub struct TextPages;

impl PageExtractor for TextPages {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, String> {
        let text = std::str::from_utf8(bytes).map_err(|err| err.to_string())?;
        if text.starts_with("BROKEN") {
            return Err("corrupt cross-reference table".to_string());
        }
        Ok(text.split('\u{c}').map(str::to_string).collect())
    }
}

/// Deterministic LLM: answers with the first line of context it was given.
#[derive(Default)]
pub struct EchoLlm {
    pub calls: AtomicUsize,
}

impl LlmProvider for EchoLlm {
    fn name(&self) -> &str {
        "echo"
    }

    fn answer(&self, request: &ProviderRequest) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let context = request
            .prompt
            .split("Context:\n")
            .nth(1)
            .and_then(|rest| rest.lines().next())
            .unwrap_or_default();
        Ok(format!("From the documents: {context}"))
    }
}

pub fn llm_settings(api_key: Option<&str>) -> LlmSettings {
    LlmSettings {
        provider: LlmProviderKind::Gemini,
        model: "gemini-1.5-flash".to_string(),
        api_key: api_key.map(str::to_string),
        temperature: 0.7,
        max_output_tokens: 256,
        timeout_secs: 5,
    }
}

pub fn settings(persist_dir: &Path, api_key: Option<&str>) -> AppSettings {
    AppSettings {
        bind: "127.0.0.1:0".parse().expect("addr"),
        persist_dir: persist_dir.to_path_buf(),
        index_name: "doc_index".to_string(),
        chunking: ChunkingConfig::default(),
        top_k: 4,
        search: SearchType::Similarity,
        memory_window: 10,
        llm: llm_settings(api_key),
        embedder: EmbedderSettings {
            kind: EmbedderKind::Hashing,
            model: String::new(),
            dimensions: 256,
            base_url: String::new(),
            api_key: None,
            timeout: std::time::Duration::from_secs(5),
            batch_size: 8,
        },
    }
}

pub fn embedder() -> Arc<HashingEmbedder> {
    Arc::new(HashingEmbedder::new(256).expect("embedder"))
}

/// App with text-page extraction and the echo LLM injected.
pub fn app_with_echo(persist_dir: &Path, llm: Arc<EchoLlm>) -> RagApp {
    let settings = settings(persist_dir, None);
    RagApp::new(&settings, embedder())
        .with_loader(DocumentLoader::with_extractor(
            settings.chunking,
            Box::new(TextPages),
        ))
        .with_llm(llm)
}

/// App with the real PDF extractor and the echo LLM injected.
pub fn app_with_pdf_loader(persist_dir: &Path, llm: Arc<EchoLlm>) -> RagApp {
    RagApp::new(&settings(persist_dir, None), embedder()).with_llm(llm)
}
