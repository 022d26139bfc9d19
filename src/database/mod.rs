// Database module
// Persistent index storage: SQLite catalog for metadata, LanceDB for vectors

pub mod lancedb;
pub mod sqlite;

pub use sqlite::Catalog;
