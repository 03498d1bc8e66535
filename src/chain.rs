//! Conversational retrieval-augmented generation.
//!
//! Each turn retrieves chunks for the question, renders them together with the
//! remembered history into a fixed prompt and makes exactly one LLM call. A
//! constructed chain never returns an error from [`ConversationalRagChain::respond`]:
//! failures are logged and replaced by [`APOLOGY_MESSAGE`].

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error};

use crate::config::LlmSettings;
use crate::error::{RagError, Result};
use crate::llm::{build_provider, LlmProvider, ProviderRequest};
use crate::loader::DocumentChunk;
use crate::memory::ConversationMemory;
use crate::vector_store::Retrieve;

/// Reply used when retrieval or generation fails.
pub const APOLOGY_MESSAGE: &str =
    "I encountered an error while processing your question. Please try again.";

/// Reply used when the model returns nothing.
pub const EMPTY_ANSWER_FALLBACK: &str = "I couldn't generate a response.";

const PROMPT_TEMPLATE: &str = "You are a helpful AI assistant that answers questions based on the provided context from uploaded documents.

Use the following pieces of context to answer the question at the end. If you don't know the answer based on the context, just say that you don't have enough information to answer the question. Don't try to make up an answer.

Always be conversational and helpful. If the context provides relevant information, use it to give a comprehensive answer.

Context:
{context}

Chat History:
{chat_history}

Question: {question}
Answer:";

/// Generation knobs for one chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOptions {
    /// Model identifier, for logs.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Exchanges remembered.
    pub memory_window: usize,
    /// Output token cap.
    pub max_output_tokens: usize,
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".to_string(),
            temperature: 0.7,
            memory_window: crate::memory::DEFAULT_MEMORY_WINDOW,
            max_output_tokens: 1024,
        }
    }
}

impl ChainOptions {
    /// Options matching the configured LLM.
    pub fn from_llm_settings(settings: &LlmSettings, memory_window: usize) -> Self {
        Self {
            model: settings.model.clone(),
            temperature: settings.temperature,
            memory_window,
            max_output_tokens: settings.max_output_tokens,
        }
    }
}

/// Answer plus the chunks it was grounded on.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainResponse {
    /// Text shown to the user.
    pub answer: String,
    /// Retrieved chunks, empty when the turn failed.
    pub source_chunks: Vec<DocumentChunk>,
}

/// Retriever, memory and LLM wired together for multi-turn Q&A.
pub struct ConversationalRagChain {
    retriever: Box<dyn Retrieve>,
    llm: Arc<dyn LlmProvider>,
    memory: ConversationMemory,
    options: ChainOptions,
}

impl ConversationalRagChain {
    /// Builds the chain and its LLM client from configuration.
    ///
    /// Fails with [`RagError::MissingCredential`] when no API key is set.
    pub fn from_settings(
        retriever: Box<dyn Retrieve>,
        settings: &LlmSettings,
        memory_window: usize,
    ) -> Result<Self> {
        let llm = build_provider(settings)?;
        Ok(Self::with_provider(
            retriever,
            llm,
            ChainOptions::from_llm_settings(settings, memory_window),
        ))
    }

    /// Builds the chain around an already constructed provider.
    pub fn with_provider(
        retriever: Box<dyn Retrieve>,
        llm: Arc<dyn LlmProvider>,
        options: ChainOptions,
    ) -> Self {
        Self {
            retriever,
            llm,
            memory: ConversationMemory::new(options.memory_window),
            options,
        }
    }

    /// Generation options.
    pub fn options(&self) -> &ChainOptions {
        &self.options
    }

    /// Answers `question`; never fails.
    pub fn respond(&mut self, question: &str) -> ChainResponse {
        match self.try_respond(question) {
            Ok(response) => response,
            Err(err) => {
                error!(error = %err, model = %self.options.model, "chain turn failed");
                ChainResponse {
                    answer: APOLOGY_MESSAGE.to_string(),
                    source_chunks: Vec::new(),
                }
            }
        }
    }

    fn try_respond(&mut self, question: &str) -> Result<ChainResponse> {
        let chunks = self.retriever.retrieve(question)?;
        let prompt = self.render_prompt(&chunks, question);
        debug!(chunks = chunks.len(), prompt_chars = prompt.len(), "calling llm");
        let request = ProviderRequest {
            prompt: &prompt,
            temperature: self.options.temperature,
            max_tokens: self.options.max_output_tokens,
        };
        let raw = self
            .llm
            .answer(&request)
            .map_err(|err| RagError::Generation(format!("{}: {err:#}", self.llm.name())))?;
        let answer = if raw.trim().is_empty() {
            EMPTY_ANSWER_FALLBACK.to_string()
        } else {
            raw.trim().to_string()
        };
        self.memory.record(question, answer.clone());
        Ok(ChainResponse {
            answer,
            source_chunks: chunks,
        })
    }

    fn render_prompt(&self, chunks: &[DocumentChunk], question: &str) -> String {
        let context = chunks
            .iter()
            .map(|chunk| chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        render_template(&context, &self.memory.render(), question)
    }

    /// Forgets the conversation history.
    pub fn clear_memory(&mut self) {
        self.memory.clear();
    }

    /// Remembered history as rendered into prompts.
    pub fn memory_summary(&self) -> String {
        self.memory.render()
    }

    /// Exchanges currently remembered.
    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }
}

impl fmt::Debug for ConversationalRagChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationalRagChain")
            .field("llm", &self.llm.name())
            .field("options", &self.options)
            .field("memory", &self.memory.len())
            .finish()
    }
}

fn render_template(context: &str, chat_history: &str, question: &str) -> String {
    // Single pass so placeholder text inside user content is never re-expanded.
    let mut out = String::with_capacity(PROMPT_TEMPLATE.len() + context.len() + question.len());
    let mut rest = PROMPT_TEMPLATE;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let (value, len) = if tail.starts_with("{context}") {
            (context, "{context}".len())
        } else if tail.starts_with("{chat_history}") {
            (chat_history, "{chat_history}".len())
        } else if tail.starts_with("{question}") {
            (question, "{question}".len())
        } else {
            ("{", 1)
        };
        out.push_str(value);
        rest = &tail[len..];
    }
    out.push_str(rest);
    out
}
