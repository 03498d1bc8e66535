//! Turns uploaded PDF files into retrieval-sized chunks.

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::{RagError, Result};
use crate::splitter::{ChunkingConfig, RecursiveSplitter};

/// File type recorded on every chunk produced by the loader.
pub const PDF_FILE_TYPE: &str = "pdf";

/// Raw upload handed over by the user-facing surface.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Original filename, used as the chunk source.
    pub name: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// Wraps a named byte buffer.
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Provenance attached to every chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Upload filename.
    pub source: String,
    /// Always `"pdf"` for loader output.
    pub file_type: String,
    /// Zero-based page index.
    pub page: usize,
}

/// Unit of retrieval: a slice of page text plus its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Trimmed chunk text.
    pub text: String,
    /// Where the text came from.
    pub metadata: ChunkMetadata,
}

/// Page-level text extraction seam.
pub trait PageExtractor: Send + Sync {
    /// Returns page texts in document order.
    fn extract_pages(&self, bytes: &[u8]) -> std::result::Result<Vec<String>, String>;
}

/// Default extractor backed by the `pdf-pages` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfPageExtractor;

impl PageExtractor for PdfPageExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> std::result::Result<Vec<String>, String> {
        pdf_pages::extract_pages(bytes)
            .map(|pages| pages.into_iter().map(|page| page.text).collect())
            .map_err(|err| err.to_string())
    }
}

/// Outcome of one ingestion batch.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Chunks from every file that could be read, in upload order.
    pub chunks: Vec<DocumentChunk>,
    /// One `RagError::Extraction` per skipped file.
    pub failures: Vec<RagError>,
}

impl IngestReport {
    /// True when nothing indexable came out of the batch.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Extracts and splits uploaded documents.
pub struct DocumentLoader {
    extractor: Box<dyn PageExtractor>,
    splitter: RecursiveSplitter,
}

impl DocumentLoader {
    /// Builds a loader that reads PDFs through `pdf-pages`.
    pub fn new(config: ChunkingConfig) -> Self {
        Self::with_extractor(config, Box::new(PdfPageExtractor))
    }

    /// Builds a loader with a custom page extractor.
    pub fn with_extractor(config: ChunkingConfig, extractor: Box<dyn PageExtractor>) -> Self {
        Self {
            extractor,
            splitter: RecursiveSplitter::new(config),
        }
    }

    /// Chunking parameters in use.
    pub fn chunking(&self) -> ChunkingConfig {
        self.splitter.config()
    }

    /// Converts a batch of uploads into chunks; unreadable files are skipped.
    pub fn process(&self, files: &[UploadedFile]) -> IngestReport {
        let mut report = IngestReport::default();
        for file in files {
            match self.load_file(file) {
                Ok(chunks) => {
                    info!(file = %file.name, chunks = chunks.len(), "ingested document");
                    report.chunks.extend(chunks);
                }
                Err(err) => {
                    error!(file = %file.name, error = %err, "skipping unreadable document");
                    report.failures.push(err);
                }
            }
        }
        report
    }

    fn load_file(&self, file: &UploadedFile) -> Result<Vec<DocumentChunk>> {
        let pages = self
            .extractor
            .extract_pages(&file.bytes)
            .map_err(|reason| RagError::Extraction {
                file: file.name.clone(),
                reason,
            })?;
        let mut chunks = Vec::new();
        for (page, text) in pages.iter().enumerate() {
            for piece in self.splitter.split_text(text) {
                chunks.push(DocumentChunk {
                    text: piece,
                    metadata: ChunkMetadata {
                        source: file.name.clone(),
                        file_type: PDF_FILE_TYPE.to_string(),
                        page,
                    },
                });
            }
        }
        Ok(chunks)
    }
}
