//! Storage backends behind one `VectorCollection` interface.
//!
//! Two variants, selected by configuration:
//!
//! - [`FlatStore`] — a [`FlatIndex`] persisted as the two flat artifacts,
//!   with cached in-memory snapshots.
//! - [`PersistentStore`] — a redb database per collection holding chunk
//!   metadata and vector rows in append-only slot order.
//!
//! The collection manager and retriever only see the trait, so the variants
//! stay interchangeable. Both enforce the same semantics: append-only slots,
//! in-place replacement on chunk-id collision, dimension fixed by the first
//! insert, and a stored embedder identity checked on every open/load.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::{
    chunking::Chunk,
    error::{Error, Result},
    index::{FlatIndex, ScoredChunk, UpsertReport},
    store::{self, IndexCache},
};

/// A named, independently managed set of chunks and their vector index.
pub trait VectorCollection {
    fn name(&self) -> &str;

    /// Number of stored records.
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Merge a batch of embedded chunks. Existing chunk ids are replaced in
    /// their slot; new ids are appended. All-or-nothing per batch.
    fn upsert(&mut self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<UpsertReport>;

    /// Exact inner-product search, descending score, ties by slot order.
    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>>;

    /// Drop every stored record. Idempotent.
    fn clear(&mut self) -> Result<()>;
}

// ---- flat artifact backend ----

/// Flat-index backend: artifacts on disk, snapshots in the shared cache.
pub struct FlatStore {
    name: String,
    dir: PathBuf,
    embedder_identity: String,
    cache: Arc<IndexCache>,
}

impl FlatStore {
    pub fn new(
        dir: &Path,
        name: &str,
        embedder_identity: &str,
        cache: Arc<IndexCache>,
    ) -> Self {
        Self {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            embedder_identity: embedder_identity.to_string(),
            cache,
        }
    }

    /// Cached snapshot, or a lazy load from the artifacts.
    ///
    /// Returns `None` when the collection has never been built.
    fn snapshot(&self) -> Result<Option<Arc<FlatIndex>>> {
        self.cache
            .get_or_load(&self.name, || match store::load(&self.dir, &self.name) {
                Ok(index) => {
                    if index.embedder_identity() != self.embedder_identity {
                        return Err(Error::EmbedderMismatch {
                            index: index.embedder_identity().to_string(),
                            embedder: self.embedder_identity.clone(),
                        });
                    }
                    Ok(Some(index))
                }
                Err(Error::IndexNotFound { .. }) => Ok(None),
                Err(e) => Err(e),
            })
    }
}

impl VectorCollection for FlatStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> Result<usize> {
        Ok(self.snapshot()?.map_or(0, |index| index.len()))
    }

    fn upsert(&mut self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<UpsertReport> {
        let mut index = match self.snapshot()? {
            Some(snapshot) => (*snapshot).clone(),
            None => FlatIndex::new(&self.embedder_identity),
        };

        let mut report = UpsertReport::default();
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            if index.upsert(chunk.clone(), embedding)? {
                report.inserted += 1;
            } else {
                report.replaced += 1;
            }
        }

        // Persist before the cache swap: a failed save leaves the previous
        // snapshot in place and the artifacts untouched.
        store::save(&index, &self.dir, &self.name)?;
        self.cache.insert(&self.name, index);
        Ok(report)
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        match self.snapshot()? {
            Some(index) => index.search(query, top_k),
            None => Ok(Vec::new()),
        }
    }

    fn clear(&mut self) -> Result<()> {
        store::remove(&self.dir, &self.name)?;
        self.cache.invalidate(&self.name);
        Ok(())
    }
}

// ---- redb document-store backend ----

const CHUNKS: TableDefinition<u64, &[u8]> = TableDefinition::new("chunks");
const VECTORS: TableDefinition<u64, &[u8]> = TableDefinition::new("vectors");
const SLOTS: TableDefinition<&str, u64> = TableDefinition::new("slots");
const META: TableDefinition<&str, &str> = TableDefinition::new("meta");

const META_IDENTITY: &str = "embedder_identity";
const META_DIMENSION: &str = "dimension";
const META_COUNT: &str = "count";

/// File name of a collection's redb database under the data directory.
pub fn persistent_path(dir: &Path, collection: &str) -> PathBuf {
    dir.join(format!("{collection}.redb"))
}

/// redb-backed collection: chunk JSON and raw f32 rows keyed by slot.
pub struct PersistentStore {
    name: String,
    db: Database,
}

impl PersistentStore {
    /// Open or create the database and bind it to one embedder identity.
    ///
    /// A database previously written with a different identity fails with
    /// [`Error::EmbedderMismatch`] instead of serving mismatched vectors.
    pub fn open(dir: &Path, name: &str, embedder_identity: &str) -> Result<Self> {
        let db = Database::create(persistent_path(dir, name))?;

        let txn = db.begin_write()?;
        {
            let mut meta = txn.open_table(META)?;
            let existing = meta.get(META_IDENTITY)?.map(|g| g.value().to_string());
            match existing {
                Some(identity) if identity != embedder_identity => {
                    return Err(Error::EmbedderMismatch {
                        index: identity,
                        embedder: embedder_identity.to_string(),
                    });
                }
                Some(_) => {}
                None => {
                    meta.insert(META_IDENTITY, embedder_identity)?;
                }
            }
            txn.open_table(CHUNKS)?;
            txn.open_table(VECTORS)?;
            txn.open_table(SLOTS)?;
        }
        txn.commit()?;

        Ok(Self {
            name: name.to_string(),
            db,
        })
    }

    fn read_meta_usize(
        table: &impl ReadableTable<&'static str, &'static str>,
        key: &str,
    ) -> Result<Option<usize>> {
        let Some(guard) = table.get(key)? else {
            return Ok(None);
        };
        guard
            .value()
            .parse()
            .map(Some)
            .map_err(|_| Error::Corrupt(format!("non-numeric {key} in meta table")))
    }
}

impl VectorCollection for PersistentStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> Result<usize> {
        let txn = self.db.begin_read()?;
        let meta = txn.open_table(META)?;
        Ok(Self::read_meta_usize(&meta, META_COUNT)?.unwrap_or(0))
    }

    fn upsert(&mut self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<UpsertReport> {
        let mut report = UpsertReport::default();

        let txn = self.db.begin_write()?;
        {
            let mut chunks_table = txn.open_table(CHUNKS)?;
            let mut vectors_table = txn.open_table(VECTORS)?;
            let mut slots_table = txn.open_table(SLOTS)?;
            let mut meta_table = txn.open_table(META)?;

            let mut dimension = Self::read_meta_usize(&meta_table, META_DIMENSION)?;
            let mut count = Self::read_meta_usize(&meta_table, META_COUNT)?.unwrap_or(0);

            for (chunk, embedding) in chunks.iter().zip(embeddings) {
                match dimension {
                    Some(dim) if embedding.len() != dim => {
                        return Err(Error::DimensionMismatch {
                            expected: dim,
                            found: embedding.len(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        if embedding.is_empty() {
                            return Err(Error::DimensionMismatch {
                                expected: 1,
                                found: 0,
                            });
                        }
                        dimension = Some(embedding.len());
                        meta_table
                            .insert(META_DIMENSION, embedding.len().to_string().as_str())?;
                    }
                }

                let existing = slots_table.get(chunk.chunk_id.as_str())?.map(|g| g.value());
                let slot = match existing {
                    Some(slot) => {
                        report.replaced += 1;
                        slot
                    }
                    None => {
                        let slot = count as u64;
                        count += 1;
                        slots_table.insert(chunk.chunk_id.as_str(), slot)?;
                        report.inserted += 1;
                        slot
                    }
                };

                chunks_table.insert(slot, serde_json::to_vec(chunk)?.as_slice())?;
                vectors_table
                    .insert(slot, bytemuck::cast_slice::<f32, u8>(embedding))?;
            }

            meta_table.insert(META_COUNT, count.to_string().as_str())?;
        }
        txn.commit()?;
        Ok(report)
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        let txn = self.db.begin_read()?;
        let meta = txn.open_table(META)?;

        let Some(dimension) = Self::read_meta_usize(&meta, META_DIMENSION)? else {
            return Ok(Vec::new());
        };
        if top_k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != dimension {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                found: query.len(),
            });
        }

        let vectors_table = txn.open_table(VECTORS)?;
        let mut scored: Vec<(u64, f32)> = Vec::new();
        for entry in vectors_table.iter()? {
            let (key, value) = entry?;
            let row: Vec<f32> = bytemuck::pod_collect_to_vec(value.value());
            let score = row.iter().zip(query).map(|(a, b)| a * b).sum();
            scored.push((key.value(), score));
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(top_k.min(scored.len()));

        let chunks_table = txn.open_table(CHUNKS)?;
        let mut hits = Vec::with_capacity(scored.len());
        for (slot, score) in scored {
            let guard = chunks_table.get(slot)?.ok_or_else(|| {
                Error::Corrupt(format!("vector row {slot} has no chunk record"))
            })?;
            let chunk: Chunk = serde_json::from_slice(guard.value())?;
            hits.push(ScoredChunk { chunk, score });
        }
        Ok(hits)
    }

    fn clear(&mut self) -> Result<()> {
        let identity = {
            let txn = self.db.begin_read()?;
            let meta = txn.open_table(META)?;
            meta.get(META_IDENTITY)?.map(|g| g.value().to_string())
        };

        let txn = self.db.begin_write()?;
        txn.delete_table(CHUNKS)?;
        txn.delete_table(VECTORS)?;
        txn.delete_table(SLOTS)?;
        txn.delete_table(META)?;
        {
            let mut meta = txn.open_table(META)?;
            if let Some(identity) = identity {
                meta.insert(META_IDENTITY, identity.as_str())?;
            }
            txn.open_table(CHUNKS)?;
            txn.open_table(VECTORS)?;
            txn.open_table(SLOTS)?;
        }
        txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> Chunk {
        Chunk::new("manual.pdf", Some((1, 1)), 0, text.to_string())
    }

    fn unit(v: &[f32]) -> Vec<f32> {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.iter().map(|x| x / norm).collect()
    }

    fn exercise_backend(backend: &mut dyn VectorCollection) {
        assert_eq!(backend.len().unwrap(), 0);
        assert!(backend.search(&unit(&[1.0, 0.0]), 4).unwrap().is_empty());

        let chunks = vec![chunk("rated load 1000 kg"), chunk("rated speed 1.75 m/s")];
        let embeddings = vec![unit(&[1.0, 0.0]), unit(&[0.0, 1.0])];
        let report = backend.upsert(&chunks, &embeddings).unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(report.replaced, 0);
        assert_eq!(backend.len().unwrap(), 2);

        let hits = backend.search(&unit(&[1.0, 0.1]), 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "rated load 1000 kg");
        assert!(hits[0].score > hits[1].score);

        // Re-upserting the same content replaces in place, no growth.
        let report = backend.upsert(&chunks, &embeddings).unwrap();
        assert_eq!(report.inserted, 0);
        assert_eq!(report.replaced, 2);
        assert_eq!(backend.len().unwrap(), 2);

        backend.clear().unwrap();
        assert_eq!(backend.len().unwrap(), 0);
        backend.clear().unwrap();
    }

    #[test]
    fn flat_store_semantics() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = Arc::new(IndexCache::new());
        let mut backend = FlatStore::new(tmp.path(), "specific", "feature-hash/2", cache);
        exercise_backend(&mut backend);
    }

    #[test]
    fn persistent_store_semantics() {
        let tmp = tempfile::tempdir().unwrap();
        let mut backend =
            PersistentStore::open(tmp.path(), "specific", "feature-hash/2").unwrap();
        exercise_backend(&mut backend);
    }

    #[test]
    fn flat_store_survives_cache_invalidation() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = Arc::new(IndexCache::new());
        let mut backend =
            FlatStore::new(tmp.path(), "specific", "feature-hash/2", Arc::clone(&cache));

        backend
            .upsert(&[chunk("rated load 1000 kg")], &[unit(&[1.0, 0.0])])
            .unwrap();

        cache.invalidate("specific");
        let hits = backend.search(&unit(&[1.0, 0.0]), 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.text, "rated load 1000 kg");
    }

    #[test]
    fn flat_store_rejects_foreign_identity() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = Arc::new(IndexCache::new());
        let mut backend =
            FlatStore::new(tmp.path(), "specific", "feature-hash/2", Arc::clone(&cache));
        backend
            .upsert(&[chunk("rated load 1000 kg")], &[unit(&[1.0, 0.0])])
            .unwrap();

        cache.clear();
        let other = FlatStore::new(tmp.path(), "specific", "other-model/2", cache);
        let err = other.search(&unit(&[1.0, 0.0]), 1).unwrap_err();
        assert!(matches!(err, Error::EmbedderMismatch { .. }));
    }

    #[test]
    fn persistent_store_rejects_foreign_identity() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let mut backend =
                PersistentStore::open(tmp.path(), "shared", "feature-hash/2").unwrap();
            backend
                .upsert(&[chunk("generic note")], &[unit(&[1.0, 0.0])])
                .unwrap();
        }
        let err = PersistentStore::open(tmp.path(), "shared", "other-model/2").unwrap_err();
        assert!(matches!(err, Error::EmbedderMismatch { .. }));
    }

    #[test]
    fn persistent_store_reopen_preserves_records() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let mut backend =
                PersistentStore::open(tmp.path(), "shared", "feature-hash/2").unwrap();
            backend
                .upsert(&[chunk("rated load 1000 kg")], &[unit(&[1.0, 0.0])])
                .unwrap();
        }
        let backend = PersistentStore::open(tmp.path(), "shared", "feature-hash/2").unwrap();
        assert_eq!(backend.len().unwrap(), 1);
        let hits = backend.search(&unit(&[1.0, 0.0]), 1).unwrap();
        assert_eq!(hits[0].chunk.text, "rated load 1000 kg");
    }

    #[test]
    fn persistent_store_dimension_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let mut backend =
            PersistentStore::open(tmp.path(), "shared", "feature-hash/2").unwrap();
        backend
            .upsert(&[chunk("first")], &[unit(&[1.0, 0.0])])
            .unwrap();

        let err = backend
            .upsert(&[chunk("second")], &[unit(&[1.0, 0.0, 0.0])])
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }
}
