//! attrieve - a two-tier chunk retrieval engine for equipment datasheet QA.
//!
//! attrieve indexes ingested documents as overlapping, content-hashed text
//! chunks and answers attribute-style queries (manufacturer / model number /
//! attribute) by exact inner-product search over normalized embeddings. Hits
//! from the "specific" collection override hits from the "shared" one, and
//! the merged evidence renders into a character-bounded context string for a
//! downstream generator.
//!
//! # Quick start
//!
//! ```
//! use std::sync::Arc;
//!
//! use attrieve::{
//!     chunking::chunk_source,
//!     collections::{CollectionManager, SPECIFIC_COLLECTION},
//!     config::EngineConfig,
//!     embed::HashEmbedder,
//!     retriever::Retriever,
//! };
//!
//! let dir = tempfile::tempdir().unwrap();
//! let config = EngineConfig::new(dir.path());
//! let mut manager =
//!     CollectionManager::new(config, Arc::new(HashEmbedder::default())).unwrap();
//!
//! let chunks = chunk_source(
//!     "fujitec-exdn.pdf",
//!     Some((1, 2)),
//!     "Fujitec EXDN elevator. Rated Load: 1000 kg. Rated Speed: 1.75 m/s.",
//!     1000,
//!     200,
//! )
//! .unwrap();
//! manager.upsert(SPECIFIC_COLLECTION, chunks).unwrap();
//!
//! let retriever = Retriever::new(&manager);
//! let context = retriever.retrieve("Fujitec", "EXDN", "Rated Load", 4).unwrap();
//! assert!(context.contains("Rated Load"));
//! ```

pub mod backend;
pub mod chunking;
pub mod collections;
pub mod config;
pub mod embed;
pub mod error;
pub mod filter;
pub mod index;
pub mod prompt;
pub mod retriever;
pub mod store;

pub use backend::VectorCollection;
pub use chunking::Chunk;
pub use collections::{CollectionManager, SHARED_COLLECTION, SPECIFIC_COLLECTION};
pub use config::{Backend, EngineConfig};
pub use embed::{Embedder, HashEmbedder};
pub use error::{Error, Result};
pub use filter::FilterSet;
pub use index::{FlatIndex, ScoredChunk, UpsertReport};
pub use retriever::{NOT_FOUND, Retriever, Tier, TierHit};
pub use store::IndexCache;
