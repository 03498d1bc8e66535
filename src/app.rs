//! Application composition: startup, document processing, chat and status.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::chain::{ChainOptions, ConversationalRagChain};
use crate::config::{AppSettings, LlmSettings};
use crate::embeddings::Embedder;
use crate::error::Result;
use crate::llm::LlmProvider;
use crate::loader::{DocumentChunk, DocumentLoader, UploadedFile};
use crate::session::{ChatMessage, ChatSession, SessionState};
use crate::vector_store::{SearchType, VectorStoreManager};

/// Shown after a saved index was restored at startup.
pub const LOADED_NOTICE: &str = "RAG system loaded from saved vector store!";
/// Shown after uploads were indexed.
pub const PROCESSED_NOTICE: &str = "Documents processed successfully!";

/// Severity of a [`Notice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    /// Neutral information.
    Info,
    /// Completed action.
    Success,
    /// Nothing broke, but nothing happened either.
    Warning,
    /// An action failed.
    Error,
}

/// Transient banner for the user-facing surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Text shown to the user.
    pub message: String,
}

impl Notice {
    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Snapshot for the status panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemStatus {
    /// Session state.
    pub state: SessionState,
    /// An index is held in memory.
    pub index_ready: bool,
    /// A manifest for the configured index exists on disk.
    pub persisted_copy_exists: bool,
    /// A chain is attached to the session.
    pub chain_active: bool,
    /// Chunks in the in-memory index.
    pub chunk_count: usize,
    /// Configured index name.
    pub index_name: String,
    /// Embedder model id.
    pub embedding_model: String,
}

/// Result of [`RagApp::process_documents`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Chunks were indexed, saved and a fresh chain attached.
    Indexed {
        /// Files read successfully.
        files: usize,
        /// Chunks added by this batch.
        chunks: usize,
        /// Files skipped because extraction failed.
        skipped: usize,
    },
    /// No text came out of the batch; nothing changed.
    NothingExtracted {
        /// Files skipped because extraction failed.
        skipped: usize,
    },
    /// Indexing or chain setup failed; see the error notice.
    Failed,
}

/// Retrieval and chat settings held by the app.
#[derive(Debug, Clone)]
struct RetrievalOptions {
    index_name: String,
    search: SearchType,
    top_k: usize,
    memory_window: usize,
}

/// One chat session over one document store.
pub struct RagApp {
    loader: DocumentLoader,
    store: VectorStoreManager,
    session: ChatSession,
    retrieval: RetrievalOptions,
    llm_settings: LlmSettings,
    llm: Option<Arc<dyn LlmProvider>>,
    notices: Vec<Notice>,
}

impl RagApp {
    /// Builds an app from settings and an embedder. Nothing is loaded yet.
    pub fn new(settings: &AppSettings, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            loader: DocumentLoader::new(settings.chunking),
            store: VectorStoreManager::new(embedder, settings.persist_dir.clone()),
            session: ChatSession::new(),
            retrieval: RetrievalOptions {
                index_name: settings.index_name.clone(),
                search: settings.search,
                top_k: settings.top_k,
                memory_window: settings.memory_window,
            },
            llm_settings: settings.llm.clone(),
            llm: None,
            notices: Vec::new(),
        }
    }

    /// Replaces the document loader.
    pub fn with_loader(mut self, loader: DocumentLoader) -> Self {
        self.loader = loader;
        self
    }

    /// Uses `llm` for every chain instead of building one from settings.
    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Restores the persisted index, if any, and attaches a chain over it.
    pub fn startup(&mut self) {
        let name = self.retrieval.index_name.clone();
        match self.store.load(&name) {
            Ok(Some(_)) => match self.build_chain() {
                Ok(chain) => {
                    self.session.attach_chain(chain);
                    self.notify(NoticeLevel::Success, LOADED_NOTICE);
                }
                Err(err) => {
                    self.notify(NoticeLevel::Error, format!("Error setting up RAG system: {err}"));
                }
            },
            Ok(None) => info!(name = %name, "no saved vector store; waiting for uploads"),
            Err(err) => {
                self.notify(NoticeLevel::Error, format!("Error loading vector store: {err}"));
            }
        }
    }

    /// Ingests uploads, updates and saves the index, and re-attaches a chain.
    pub fn process_documents(&mut self, files: &[UploadedFile]) -> ProcessOutcome {
        if files.is_empty() {
            self.notify(NoticeLevel::Warning, "Please upload at least one PDF file.");
            return ProcessOutcome::NothingExtracted { skipped: 0 };
        }
        let report = self.loader.process(files);
        let skipped = report.failures.len();
        for failure in &report.failures {
            self.notify(NoticeLevel::Error, format!("Error processing document: {failure}"));
        }
        if report.chunks.is_empty() {
            self.notify(
                NoticeLevel::Warning,
                "No text could be extracted from the uploaded files.",
            );
            return ProcessOutcome::NothingExtracted { skipped };
        }

        let chunks = report.chunks.len();
        match self.index_chunks(&report.chunks) {
            Ok(chain) => {
                self.session.attach_chain(chain);
                info!(files = files.len(), chunks, skipped, "documents processed");
                self.notify(NoticeLevel::Success, PROCESSED_NOTICE);
                ProcessOutcome::Indexed {
                    files: files.len() - skipped,
                    chunks,
                    skipped,
                }
            }
            Err(err) => {
                self.notify(NoticeLevel::Error, format!("Error processing documents: {err}"));
                ProcessOutcome::Failed
            }
        }
    }

    fn index_chunks(&mut self, chunks: &[DocumentChunk]) -> Result<ConversationalRagChain> {
        if self.store.has_index() {
            self.store.add(chunks)?;
        } else {
            self.store.create(chunks)?;
        }
        self.store.save(&self.retrieval.index_name)?;
        self.build_chain()
    }

    fn build_chain(&self) -> Result<ConversationalRagChain> {
        let retriever = self
            .store
            .retriever(self.retrieval.search, self.retrieval.top_k)?;
        let window = self.retrieval.memory_window;
        match &self.llm {
            Some(llm) => Ok(ConversationalRagChain::with_provider(
                Box::new(retriever),
                Arc::clone(llm),
                ChainOptions::from_llm_settings(&self.llm_settings, window),
            )),
            None => ConversationalRagChain::from_settings(
                Box::new(retriever),
                &self.llm_settings,
                window,
            ),
        }
    }

    /// Runs one chat turn and returns the transcript.
    pub fn ask(&mut self, question: &str) -> &[ChatMessage] {
        self.session.ask(question)
    }

    /// Empties the transcript and chain memory; the index stays.
    pub fn clear_chat(&mut self) {
        self.session.clear();
    }

    /// Chat session, for inspection.
    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    /// Transcript, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        self.session.transcript()
    }

    /// Status panel snapshot.
    pub fn status(&self) -> SystemStatus {
        SystemStatus {
            state: self.session.state(),
            index_ready: self.store.has_index(),
            persisted_copy_exists: self.store.persisted_exists(&self.retrieval.index_name),
            chain_active: self.session.is_ready(),
            chunk_count: self.store.len(),
            index_name: self.retrieval.index_name.clone(),
            embedding_model: self.store.embedder().model_id().to_string(),
        }
    }

    /// Pending notices, oldest first, without draining them.
    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    /// Drains pending notices.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Queues a notice for the next render.
    pub fn notify(&mut self, level: NoticeLevel, message: impl Into<String>) {
        let notice = Notice::new(level, message);
        match level {
            NoticeLevel::Error => warn!(message = %notice.message, "error notice"),
            _ => info!(message = %notice.message, "notice"),
        }
        self.notices.push(notice);
    }
}
