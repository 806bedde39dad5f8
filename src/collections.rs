//! Named collections of embedded chunks and the operations on them.
//!
//! The manager owns the embedder handle, the engine configuration, and the
//! shared index cache. Collections are addressed by name; the retrieval
//! tiers use ["specific"](SPECIFIC_COLLECTION) and
//! ["shared"](SHARED_COLLECTION), but any name works for single-collection
//! deployments.
//!
//! Writes take `&mut self`, so one writer at a time is enforced by
//! ownership; concurrent readers keep searching the last cached snapshot
//! until a completed write swaps it.

use std::sync::Arc;

use crate::{
    backend::{self, FlatStore, PersistentStore, VectorCollection},
    chunking::{self, Chunk},
    config::{Backend, EngineConfig},
    embed::Embedder,
    error::Result,
    filter::FilterSet,
    index::{ScoredChunk, UpsertReport},
    store::IndexCache,
};

/// Collection holding documents for the equipment model being queried.
pub const SPECIFIC_COLLECTION: &str = "specific";

/// Collection holding shared reference material used as fallback evidence.
pub const SHARED_COLLECTION: &str = "shared";

/// Owns the named collections and routes upsert/delete/query to the
/// configured backend.
pub struct CollectionManager {
    config: EngineConfig,
    embedder: Arc<dyn Embedder>,
    cache: Arc<IndexCache>,
}

impl CollectionManager {
    /// Create a manager over the configured data directory, creating the
    /// directory if needed.
    pub fn new(config: EngineConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config.ensure_data_dir()?;
        Ok(Self {
            config,
            embedder,
            cache: Arc::new(IndexCache::new()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    fn writer(&self, collection: &str) -> Result<Box<dyn VectorCollection>> {
        Ok(match self.config.backend {
            Backend::Flat => Box::new(FlatStore::new(
                &self.config.data_dir,
                collection,
                self.embedder.identity(),
                Arc::clone(&self.cache),
            )),
            Backend::Persistent => Box::new(PersistentStore::open(
                &self.config.data_dir,
                collection,
                self.embedder.identity(),
            )?),
        })
    }

    /// A read handle, or `None` when the collection has never been built.
    ///
    /// The persistent backend is only opened when its database file already
    /// exists, so querying an absent collection leaves no artifacts behind.
    fn reader(&self, collection: &str) -> Result<Option<Box<dyn VectorCollection>>> {
        match self.config.backend {
            Backend::Flat => Ok(Some(Box::new(FlatStore::new(
                &self.config.data_dir,
                collection,
                self.embedder.identity(),
                Arc::clone(&self.cache),
            )))),
            Backend::Persistent => {
                if backend::persistent_path(&self.config.data_dir, collection).exists() {
                    Ok(Some(Box::new(PersistentStore::open(
                        &self.config.data_dir,
                        collection,
                        self.embedder.identity(),
                    )?)))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Embed and merge a batch of chunks into the named collection.
    ///
    /// The batch is deduplicated by content hash first (first occurrence
    /// wins); chunk ids already stored are replaced in their slot. The whole
    /// batch is embedded before anything is written, so an embedding failure
    /// leaves the collection untouched.
    pub fn upsert(&mut self, collection: &str, chunks: Vec<Chunk>) -> Result<UpsertReport> {
        let chunks = chunking::dedup_chunks(chunks);
        if chunks.is_empty() {
            return Ok(UpsertReport::default());
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embedder.embed(&texts)?;

        let report = self.writer(collection)?.upsert(&chunks, &embeddings)?;
        tracing::info!(
            collection,
            inserted = report.inserted,
            replaced = report.replaced,
            "upserted chunk batch"
        );
        Ok(report)
    }

    /// Drop the named collection and invalidate its cache entry.
    /// Deleting an absent collection is a no-op.
    pub fn delete(&mut self, collection: &str) -> Result<()> {
        match self.config.backend {
            Backend::Flat => {
                self.writer(collection)?.clear()?;
            }
            Backend::Persistent => {
                let path = backend::persistent_path(&self.config.data_dir, collection);
                match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        self.cache.invalidate(collection);
        tracing::info!(collection, "deleted collection");
        Ok(())
    }

    /// Embed the query text, search the named collection, and apply the
    /// filters to the ranked hits.
    ///
    /// Filtering happens after ranking, so fewer than `k` results may come
    /// back. An absent collection yields no hits rather than an error, which
    /// lets retrieval tiers be optional.
    pub fn query(
        &self,
        collection: &str,
        query_text: &str,
        filters: &FilterSet,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let Some(reader) = self.reader(collection)? else {
            return Ok(Vec::new());
        };

        let query_embedding = self.embedder.embed_one(query_text)?;
        let ranked = reader.search(&query_embedding, k)?;
        let total = ranked.len();
        let hits: Vec<ScoredChunk> = ranked
            .into_iter()
            .filter(|hit| filters.matches(&hit.chunk))
            .collect();

        tracing::debug!(
            collection,
            ranked = total,
            kept = hits.len(),
            "query with post-rank filtering"
        );
        Ok(hits)
    }

    /// Number of records stored in the named collection (0 when absent).
    pub fn record_count(&self, collection: &str) -> Result<usize> {
        match self.reader(collection)? {
            Some(reader) => reader.len(),
            None => Ok(0),
        }
    }
}
