// LanceDB vector database module
// Stores chunk vectors alongside their text for similarity search


pub mod vector_store;

use serde::{Deserialize, Serialize};

/// Name of the LanceDB table holding chunk vectors
pub const CHUNKS_TABLE: &str = "chunks";

/// Embedding record stored in LanceDB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Unique identifier for this embedding
    pub id: String,
    /// The vector embedding, sized to the index dimension
    pub vector: Vec<f32>,
    /// The chunk this embedding represents
    pub metadata: ChunkMetadata,
}

/// Chunk text and provenance stored alongside its embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Title of the source document
    pub document_title: String,
    /// Heading path (e.g., "Cats > Biology > Senses")
    pub heading_path: String,
    /// The actual text content of the chunk
    pub content: String,
    /// Index of this chunk within its document
    pub chunk_index: u32,
    /// Token count of the chunk
    pub token_count: u32,
}
