use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("invalid filter pattern: {0}")]
    Filter(#[from] regex::Error),

    #[error("cannot build an index from zero chunks")]
    EmptyIndex,

    #[error("no persisted index for collection: {collection}")]
    IndexNotFound { collection: String },

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("embedding dimension changed: index has {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("index was built with embedder {index}, current embedder is {embedder}")]
    EmbedderMismatch { index: String, embedder: String },

    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    ChunkConfig { size: usize, overlap: usize },

    #[error("corrupt index artifact: {0}")]
    Corrupt(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}
