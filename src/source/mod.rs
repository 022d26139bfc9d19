// Document source module
// Fetches the configured articles as plain-text documents

pub mod wikipedia;

use async_trait::async_trait;

use crate::Result;

pub use wikipedia::WikipediaClient;

/// A fetched article: its configured title and plain-text body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub title: String,
    pub body: String,
}

#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetch every title, in order. Fails with `RagError::SourceFetch` if
    /// any title cannot be resolved; partial results are never returned.
    async fn fetch(&self, titles: &[String], suggest_alternate: bool) -> Result<Vec<Document>>;
}
