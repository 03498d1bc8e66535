//! Manifest describing a persisted vector index.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use crc32fast::Hasher as Crc32;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Written last when saving; its presence is what makes an index loadable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Index name, also the file stem of every sibling file.
    pub name: String,
    /// Embedder model id that produced the vectors.
    pub embedding_model: String,
    /// Vector width.
    pub dimensions: usize,
    /// Number of chunks (and vectors).
    pub chunk_count: usize,
    /// File holding little-endian `f32` rows, relative to the manifest.
    pub vectors_file: String,
    /// JSONL file with one chunk per line, relative to the manifest.
    pub chunks_file: String,
    /// CRC32 of the vectors file.
    pub vectors_checksum: u32,
    /// Save time.
    pub saved_at: DateTime<Utc>,
}

impl IndexManifest {
    /// Manifest path for `name` inside `dir`.
    pub fn path_for(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.manifest.json"))
    }

    /// Vectors file name for `name`.
    pub fn vectors_file_name(name: &str) -> String {
        format!("{name}.vectors")
    }

    /// Chunks file name for `name`.
    pub fn chunks_file_name(name: &str) -> String {
        format!("{name}.chunks.jsonl")
    }

    /// Reads a manifest, returning `None` when the file does not exist.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let manifest = serde_json::from_slice(&raw)
            .map_err(|err| RagError::persistence(path, format!("unreadable manifest: {err}")))?;
        Ok(Some(manifest))
    }

    /// Writes the manifest through a temporary sibling and an atomic rename.
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            serde_json::to_writer_pretty(&mut file, self)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// CRC32 of a byte buffer.
pub fn checksum(bytes: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(bytes);
    hasher.finalize()
}
