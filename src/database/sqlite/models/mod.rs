
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Keys stored in the `index_metadata` table
pub mod metadata_keys {
    pub const FORMAT_VERSION: &str = "format_version";
    pub const EMBEDDING_MODEL: &str = "embedding_model";
    pub const EMBEDDING_DIMENSION: &str = "embedding_dimension";
    pub const CHUNK_COUNT: &str = "chunk_count";
    pub const CREATED_AT: &str = "created_at";
}

/// A source document recorded in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DocumentRecord {
    pub position: i64,
    pub title: String,
    pub body_length: i64,
    pub chunk_count: i64,
    pub fetched_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocumentRecord {
    pub position: i64,
    pub title: String,
    pub body_length: i64,
    pub chunk_count: i64,
}
