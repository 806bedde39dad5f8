//! On-disk persistence for [`FlatIndex`] and the in-process index cache.
//!
//! Each collection persists as two co-located artifacts keyed by collection
//! name:
//!
//! - `<collection>.vec` — the vector blob. Little-endian layout:
//!   magic `"AVIX"` (4 bytes), format version (u16), embedder identity
//!   length (u16) and bytes, row count (u32), dimension (u32), then
//!   `count * dimension` f32 values row-major.
//! - `<collection>.json` — the metadata sidecar: embedder identity,
//!   dimension, and the chunk array in slot order.
//!
//! Both artifacts carry the embedder identity/dimension so that an index
//! built with a different embedding model is detected on load instead of
//! silently serving mismatched vectors.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use serde::{Deserialize, Serialize};

use crate::{
    chunking::Chunk,
    error::{Error, Result},
    index::FlatIndex,
};

const MAGIC: [u8; 4] = *b"AVIX";
const FORMAT_VERSION: u16 = 1;
/// Magic + version + identity length, before the variable-length identity.
const FIXED_PREFIX: usize = 4 + 2 + 2;

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    embedder_identity: String,
    dimension: usize,
    chunks: Vec<Chunk>,
}

fn vectors_path(dir: &Path, collection: &str) -> PathBuf {
    dir.join(format!("{collection}.vec"))
}

fn sidecar_path(dir: &Path, collection: &str) -> PathBuf {
    dir.join(format!("{collection}.json"))
}

/// Whether both artifacts for a collection exist on disk.
pub fn exists(dir: &Path, collection: &str) -> bool {
    vectors_path(dir, collection).exists() && sidecar_path(dir, collection).exists()
}

/// Persist an index as the two artifacts for `collection` under `dir`.
///
/// Each artifact is written to a temp file and renamed into place, so a
/// failed write never leaves a torn artifact; an error from either write
/// propagates and the caller must not update its cache.
pub fn save(index: &FlatIndex, dir: &Path, collection: &str) -> Result<()> {
    let identity = index.embedder_identity().as_bytes();
    let mut blob =
        Vec::with_capacity(FIXED_PREFIX + identity.len() + 8 + index.vectors().len() * 4);
    blob.extend_from_slice(&MAGIC);
    blob.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    blob.extend_from_slice(&(identity.len() as u16).to_le_bytes());
    blob.extend_from_slice(identity);
    blob.extend_from_slice(&(index.len() as u32).to_le_bytes());
    blob.extend_from_slice(&(index.dimension() as u32).to_le_bytes());
    blob.extend_from_slice(bytemuck::cast_slice(index.vectors()));

    let sidecar = Sidecar {
        embedder_identity: index.embedder_identity().to_string(),
        dimension: index.dimension(),
        chunks: index.chunks().to_vec(),
    };

    write_atomic(&vectors_path(dir, collection), &blob)?;
    write_atomic(&sidecar_path(dir, collection), &serde_json::to_vec(&sidecar)?)?;

    tracing::debug!(collection, records = index.len(), "saved index artifacts");
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Load a collection's index from its two artifacts.
///
/// Fails with [`Error::IndexNotFound`] if either artifact is missing and
/// [`Error::Corrupt`] if the blob header disagrees with the sidecar.
pub fn load(dir: &Path, collection: &str) -> Result<FlatIndex> {
    if !exists(dir, collection) {
        return Err(Error::IndexNotFound {
            collection: collection.to_string(),
        });
    }

    let blob = fs::read(vectors_path(dir, collection))?;
    if blob.len() < FIXED_PREFIX {
        return Err(Error::Corrupt("vector blob shorter than header".to_string()));
    }
    if blob[0..4] != MAGIC {
        return Err(Error::Corrupt("bad magic in vector blob".to_string()));
    }
    let version = u16::from_le_bytes(blob[4..6].try_into().expect("fixed slice"));
    if version != FORMAT_VERSION {
        return Err(Error::Corrupt(format!(
            "unsupported vector blob version {version}"
        )));
    }
    let identity_len =
        u16::from_le_bytes(blob[6..8].try_into().expect("fixed slice")) as usize;
    let header_size = FIXED_PREFIX + identity_len + 8;
    if blob.len() < header_size {
        return Err(Error::Corrupt("vector blob shorter than header".to_string()));
    }
    let blob_identity = std::str::from_utf8(&blob[FIXED_PREFIX..FIXED_PREFIX + identity_len])
        .map_err(|_| Error::Corrupt("non-UTF-8 embedder identity in blob".to_string()))?
        .to_string();
    let counts = FIXED_PREFIX + identity_len;
    let count =
        u32::from_le_bytes(blob[counts..counts + 4].try_into().expect("fixed slice")) as usize;
    let dimension = u32::from_le_bytes(
        blob[counts + 4..counts + 8].try_into().expect("fixed slice"),
    ) as usize;

    let payload = &blob[header_size..];
    if payload.len() != count * dimension * 4 {
        return Err(Error::Corrupt(format!(
            "vector blob payload is {} bytes, header says {count} rows of dimension {dimension}",
            payload.len()
        )));
    }
    let vectors: Vec<f32> = bytemuck::pod_collect_to_vec(payload);

    let sidecar: Sidecar =
        serde_json::from_slice(&fs::read(sidecar_path(dir, collection))?)?;
    if sidecar.dimension != dimension || sidecar.chunks.len() != count {
        return Err(Error::Corrupt(format!(
            "sidecar has {} chunks of dimension {}, blob has {count} rows of dimension {dimension}",
            sidecar.chunks.len(),
            sidecar.dimension
        )));
    }
    if sidecar.embedder_identity != blob_identity {
        return Err(Error::Corrupt(format!(
            "blob was written by {blob_identity}, sidecar says {}",
            sidecar.embedder_identity
        )));
    }

    tracing::debug!(collection, records = count, "loaded index artifacts");
    FlatIndex::from_parts(sidecar.embedder_identity, dimension, vectors, sidecar.chunks)
}

/// Remove a collection's artifacts. Missing files are ignored so the
/// operation is idempotent.
pub fn remove(dir: &Path, collection: &str) -> Result<()> {
    for path in [vectors_path(dir, collection), sidecar_path(dir, collection)] {
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Process-wide cache of loaded indexes, one snapshot per collection.
///
/// Readers clone an `Arc` and keep searching their snapshot; a completed
/// write [`insert`](IndexCache::insert)s the replacement before the next
/// read, and [`invalidate`](IndexCache::invalidate) forces a reload from
/// disk on the next access. The cache never owns persisted data; it is a
/// rebuildable projection of the artifacts.
#[derive(Debug, Default)]
pub struct IndexCache {
    entries: RwLock<HashMap<String, Arc<FlatIndex>>>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, collection: &str) -> Option<Arc<FlatIndex>> {
        self.entries
            .read()
            .expect("cache lock poisoned")
            .get(collection)
            .cloned()
    }

    /// The cached snapshot for `collection`, or the result of `load`
    /// populated into the cache.
    ///
    /// `load` returning `Ok(None)` means the collection has never been
    /// built; nothing is cached and the next access tries again.
    pub fn get_or_load<F>(&self, collection: &str, load: F) -> Result<Option<Arc<FlatIndex>>>
    where
        F: FnOnce() -> Result<Option<FlatIndex>>,
    {
        if let Some(index) = self.get(collection) {
            return Ok(Some(index));
        }
        match load()? {
            Some(index) => Ok(Some(self.insert(collection, index))),
            None => Ok(None),
        }
    }

    pub fn insert(&self, collection: &str, index: FlatIndex) -> Arc<FlatIndex> {
        let snapshot = Arc::new(index);
        self.entries
            .write()
            .expect("cache lock poisoned")
            .insert(collection.to_string(), Arc::clone(&snapshot));
        snapshot
    }

    pub fn invalidate(&self, collection: &str) {
        self.entries
            .write()
            .expect("cache lock poisoned")
            .remove(collection);
    }

    pub fn clear(&self) {
        self.entries.write().expect("cache lock poisoned").clear();
    }
}
