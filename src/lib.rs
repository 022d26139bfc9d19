use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to fetch document '{title}': {message}")]
    SourceFetch { title: String, message: String },

    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    #[error("Generation service error: {0}")]
    GenerationService(String),

    #[error("Index at {} is unreadable: {message}. Clear the index to rebuild it", path.display())]
    IndexCorrupt { path: PathBuf, message: String },

    #[error(
        "Index was built with embedding model '{indexed}' but '{configured}' is configured. Clear the index to rebuild it"
    )]
    EmbeddingModelMismatch { indexed: String, configured: String },

    #[error("Embedding dimension mismatch: index uses {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("The index contains no chunks to answer from")]
    EmptyIndex,

    #[error("Invalid question: {0}")]
    InvalidQuestion(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Index build failed: {0}")]
    BuildFailed(#[source] Arc<RagError>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// The underlying error, looking through a shared build failure.
    #[inline]
    pub fn root(&self) -> &RagError {
        match self {
            Self::BuildFailed(inner) => inner.root(),
            other => other,
        }
    }
}

impl From<config::ConfigError> for RagError {
    #[inline]
    fn from(error: config::ConfigError) -> Self {
        Self::Config(error.to_string())
    }
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod generation;
pub(crate) mod http;
pub mod index;
pub mod indexer;
pub mod openai;
pub mod query;
pub mod session;
pub mod source;
