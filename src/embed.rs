//! Embedding boundary between the retrieval engine and the model runtime.
//!
//! The engine only ever sees the [`Embedder`] trait: fixed-dimension,
//! unit-normalized vectors so that inner-product similarity equals cosine
//! similarity. Whatever invokes the actual model (a local
//! sentence-transformer, a remote endpoint) lives behind this boundary.
//!
//! [`HashEmbedder`] is the built-in implementation: a deterministic
//! feature-hashing projection. It needs no model weights, which makes the
//! whole engine runnable offline and keeps tests hermetic.

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use rayon::prelude::*;

use crate::error::{Error, Result};

/// Converts chunk or query text into fixed-dimension unit vectors.
///
/// Contract: `embed` is deterministic for a given `identity`, returns one
/// vector per input text, and fails the whole batch on any per-text failure;
/// callers never see partial output.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the underlying model, stored alongside every
    /// persisted index so that a model swap is detected on load.
    fn identity(&self) -> &str;

    /// Output dimension of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts. All-or-nothing: any failure aborts the batch.
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.embed(&[text])?;
        batch.pop().ok_or_else(|| {
            Error::Embedding("embedder returned no vector for input".to_string())
        })
    }
}

/// Deterministic feature-hashing embedder.
///
/// Lowercased alphanumeric tokens (unigrams and adjacent bigrams) are hashed
/// into `dimension` signed buckets and the result is L2-normalized. Not a
/// semantic model, but deterministic, order-of-magnitude cheap, and good
/// enough for keyword-heavy attribute lookups and for tests.
///
/// # Examples
///
/// ```
/// use attrieve::embed::{Embedder, HashEmbedder};
///
/// let embedder = HashEmbedder::new(64);
/// let v = embedder.embed_one("Rated Load 1000 kg").unwrap();
/// assert_eq!(v.len(), 64);
/// let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
/// assert!((norm - 1.0).abs() < 1e-5);
/// ```
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    identity: String,
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            identity: format!("feature-hash/{dimension}"),
            dimension,
        }
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        if tokens.is_empty() {
            return Err(Error::Embedding(format!(
                "no tokens to embed in text: {text:?}"
            )));
        }

        let mut vector = vec![0.0f32; self.dimension];
        for token in &tokens {
            bump(&mut vector, token);
        }
        for pair in tokens.windows(2) {
            bump(&mut vector, &(pair[0], pair[1]));
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        for x in &mut vector {
            *x /= norm;
        }
        Ok(vector)
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

/// Hash a feature into its bucket with a sign bit.
fn bump<T: Hash>(vector: &mut [f32], feature: &T) {
    let mut hasher = DefaultHasher::new();
    feature.hash(&mut hasher);
    let h = hasher.finish();
    let bucket = (h % vector.len() as u64) as usize;
    let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
    vector[bucket] += sign;
}

impl Embedder for HashEmbedder {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts
            .par_iter()
            .map(|text| self.embed_text(text))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_across_calls() {
        let embedder = HashEmbedder::new(128);
        let a = embedder.embed_one("Fujitec EXDN rated load").unwrap();
        let b = embedder.embed_one("Fujitec EXDN rated load").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn vectors_are_unit_normalized() {
        let embedder = HashEmbedder::new(64);
        for text in ["short", "a much longer text with many repeated words words words"] {
            let v = embedder.embed_one(text).unwrap();
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5, "norm for {text:?} was {norm}");
        }
    }

    #[test]
    fn similar_text_scores_higher_than_unrelated() {
        let embedder = HashEmbedder::new(256);
        let query = embedder.embed_one("rated load capacity").unwrap();
        let close = embedder.embed_one("the rated load capacity is 1000 kg").unwrap();
        let far = embedder.embed_one("paint color options and warranty").unwrap();

        let dot = |a: &[f32], b: &[f32]| -> f32 {
            a.iter().zip(b).map(|(x, y)| x * y).sum()
        };
        assert!(dot(&query, &close) > dot(&query, &far));
    }

    #[test]
    fn batch_returns_one_vector_per_text() {
        let embedder = HashEmbedder::new(32);
        let out = embedder.embed(&["one", "two", "three"]).unwrap();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|v| v.len() == 32));
    }

    #[test]
    fn whole_batch_fails_together() {
        let embedder = HashEmbedder::new(32);
        let err = embedder.embed(&["fine", "   ", "also fine"]).unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }

    #[test]
    fn identity_carries_dimension() {
        assert_eq!(HashEmbedder::new(48).identity(), "feature-hash/48");
        assert_ne!(
            HashEmbedder::new(48).identity(),
            HashEmbedder::new(64).identity()
        );
    }
}
