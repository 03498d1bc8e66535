#![warn(missing_docs)]
//! Chat with uploaded PDF documents through retrieval-augmented generation.
//!
//! Uploads are split into chunks, embedded into a flat vector index that is
//! persisted between runs, and questions are answered by an LLM prompted with
//! the retrieved chunks plus a window of recent conversation.

pub mod app;
pub mod chain;
pub mod config;
pub mod embedder;
pub mod embeddings;
pub mod error;
pub mod llm;
pub mod loader;
pub mod manifest;
pub mod memory;
pub mod session;
pub mod splitter;
pub mod vector_store;
pub mod web;

pub use app::{Notice, NoticeLevel, ProcessOutcome, RagApp, SystemStatus};
pub use chain::{ChainOptions, ChainResponse, ConversationalRagChain};
pub use config::{AppSettings, Cli, EmbedderKind, LlmProviderKind, LlmSettings};
pub use embeddings::Embedder;
pub use error::{RagError, Result};
pub use loader::{ChunkMetadata, DocumentChunk, DocumentLoader, PageExtractor, UploadedFile};
pub use memory::ConversationMemory;
pub use session::{ChatMessage, ChatSession, Role, SessionState};
pub use splitter::{ChunkingConfig, RecursiveSplitter};
pub use vector_store::{Retrieve, Retriever, SearchType, VectorStoreManager};
