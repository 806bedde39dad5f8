//! Exact inner-product index over an append-only array of chunk vectors.
//!
//! Vectors live in one flat row-major buffer; row *i* always corresponds to
//! `chunks[i]`, and that correspondence is the integer-id space used for
//! tie-breaking. Inserts are append-only (an upsert of an existing chunk id
//! overwrites its slot in place, never reorders).

use std::collections::HashMap;

use rayon::prelude::*;

use crate::{
    chunking::Chunk,
    error::{Error, Result},
};

/// A search hit: the matched chunk plus its cosine similarity.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// What an upsert batch did to an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub inserted: usize,
    pub replaced: usize,
}

/// Flat exact-search vector index with a parallel chunk metadata array.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    embedder_identity: String,
    /// Fixed by the first insert; 0 while the index is empty.
    dimension: usize,
    /// Row-major `len * dimension` buffer.
    vectors: Vec<f32>,
    chunks: Vec<Chunk>,
    slots: HashMap<String, usize>,
}

impl FlatIndex {
    /// Create an empty index bound to one embedder identity.
    pub fn new(embedder_identity: &str) -> Self {
        Self {
            embedder_identity: embedder_identity.to_string(),
            dimension: 0,
            vectors: Vec::new(),
            chunks: Vec::new(),
            slots: HashMap::new(),
        }
    }

    /// Build an index from parallel chunk/embedding arrays.
    ///
    /// Fails with [`Error::EmptyIndex`] when `chunks` is empty and
    /// [`Error::DimensionMismatch`] when the embeddings are ragged.
    /// Duplicate chunk ids within the batch keep the first occurrence.
    pub fn build(
        embedder_identity: &str,
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Err(Error::EmptyIndex);
        }
        if chunks.len() != embeddings.len() {
            return Err(Error::Embedding(format!(
                "{} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let mut index = Self::new(embedder_identity);
        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            if index.slots.contains_key(&chunk.chunk_id) {
                continue;
            }
            index.upsert(chunk, &embedding)?;
        }
        Ok(index)
    }

    /// Rebuild from persisted parts. Used by the store on load.
    pub(crate) fn from_parts(
        embedder_identity: String,
        dimension: usize,
        vectors: Vec<f32>,
        chunks: Vec<Chunk>,
    ) -> Result<Self> {
        if dimension == 0 || vectors.len() != chunks.len() * dimension {
            return Err(Error::Corrupt(format!(
                "{} vector values for {} chunks of dimension {}",
                vectors.len(),
                chunks.len(),
                dimension
            )));
        }
        let slots = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (c.chunk_id.clone(), i))
            .collect();
        Ok(Self {
            embedder_identity,
            dimension,
            vectors,
            chunks,
            slots,
        })
    }

    /// Insert a chunk, or replace the stored text/metadata/vector in place
    /// when its `chunk_id` already has a slot. Returns `true` on insert,
    /// `false` on replace.
    ///
    /// The first insert fixes the index dimension; later inserts with a
    /// different dimension fail with [`Error::DimensionMismatch`].
    pub fn upsert(&mut self, chunk: Chunk, embedding: &[f32]) -> Result<bool> {
        if self.dimension == 0 {
            if embedding.is_empty() {
                return Err(Error::DimensionMismatch {
                    expected: 1,
                    found: 0,
                });
            }
            self.dimension = embedding.len();
        } else if embedding.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                found: embedding.len(),
            });
        }

        if let Some(&slot) = self.slots.get(&chunk.chunk_id) {
            let start = slot * self.dimension;
            self.vectors[start..start + self.dimension].copy_from_slice(embedding);
            self.chunks[slot] = chunk;
            return Ok(false);
        }

        let slot = self.chunks.len();
        self.vectors.extend_from_slice(embedding);
        self.slots.insert(chunk.chunk_id.clone(), slot);
        self.chunks.push(chunk);
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn embedder_identity(&self) -> &str {
        &self.embedder_identity
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        self.slots.contains_key(chunk_id)
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub(crate) fn vectors(&self) -> &[f32] {
        &self.vectors
    }

    /// Exact inner-product nearest neighbors.
    ///
    /// With unit-normalized inputs the scores are cosine similarities in
    /// `[-1, 1]`. Results are ordered by descending score, ties broken by
    /// ascending insertion slot. `top_k` is clamped to the index size.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        if self.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                found: query.len(),
            });
        }

        let dim = self.dimension;
        let mut scored: Vec<(usize, f32)> = (0..self.len())
            .into_par_iter()
            .map(|slot| {
                let row = &self.vectors[slot * dim..(slot + 1) * dim];
                let score = row.iter().zip(query).map(|(a, b)| a * b).sum();
                (slot, score)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(top_k.min(self.len()));

        Ok(scored
            .into_iter()
            .map(|(slot, score)| ScoredChunk {
                chunk: self.chunks[slot].clone(),
                score,
            })
            .collect())
    }
}
