//! Engine configuration: data directory, backend selection, chunking and
//! retrieval defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of hits requested per tier.
pub const DEFAULT_TOP_K: usize = 4;

/// Default character budget for a rendered context.
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 6000;

/// Which storage variant backs each collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Flat in-memory index persisted as blob + sidecar artifacts.
    Flat,
    /// redb document store, one database file per collection.
    Persistent,
}

/// Configuration shared by the collection manager and retriever.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding every collection's artifacts.
    pub data_dir: PathBuf,
    pub backend: Backend,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub max_context_chars: usize,
}

impl EngineConfig {
    /// Configuration with defaults over an explicit data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            backend: Backend::Flat,
            chunk_size: crate::chunking::DEFAULT_CHUNK_SIZE,
            chunk_overlap: crate::chunking::DEFAULT_CHUNK_OVERLAP,
            top_k: DEFAULT_TOP_K,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }

    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path
    /// 2. The ATTRIEVE_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/attrieve/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Ok(val) = std::env::var("ATTRIEVE_DATA_DIR") {
            PathBuf::from(val)
        } else {
            xdg::BaseDirectories::with_prefix("attrieve")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?
        };

        let config = Self::new(root);
        config.ensure_data_dir()?;
        Ok(config)
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_max_context_chars(mut self, max_context_chars: usize) -> Self {
        self.max_context_chars = max_context_chars;
        self
    }

    /// Create the data directory if it does not exist yet.
    pub fn ensure_data_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .map_err(|_| Error::DataDir(self.data_dir.clone()))
    }
}
