// Embeddings module
// The embedding provider seam and content chunking

pub mod chunking;

use async_trait::async_trait;

use crate::Result;

pub use chunking::{
    ChunkingConfig, ContentChunk, chunk_document, embedding_input, estimate_token_count,
};

/// Converts text into fixed-length vectors.
///
/// Every vector in an index must come from the same model, so
/// implementations report a stable `model_id` that is stamped into the
/// persisted index and checked again at load time.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts, one vector per input in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}
