use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::sqlite::models::{DocumentRecord, NewDocumentRecord};
use crate::database::sqlite::queries::{DocumentQueries, MetadataQueries};


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

/// File name of the catalog inside an index directory
pub const CATALOG_FILE: &str = "catalog.db";

/// SQLite catalog holding the index stamp and the documents it was built from
#[derive(Debug, Clone)]
pub struct Catalog {
    pool: DbPool,
}

impl Catalog {
    /// Create a fresh catalog in `index_dir` and apply the schema
    #[inline]
    pub async fn create(index_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(index_dir).with_context(|| {
            format!("Failed to create index directory: {}", index_dir.display())
        })?;

        let pool = Self::connect(index_dir, true).await?;
        let catalog = Self { pool };
        catalog.run_migrations().await?;

        Ok(catalog)
    }

    /// Open the catalog of an existing index without creating anything
    #[inline]
    pub async fn open_existing(index_dir: &Path) -> Result<Self> {
        let path = index_dir.join(CATALOG_FILE);
        if !path.is_file() {
            anyhow::bail!("Catalog file {} is missing", path.display());
        }

        let pool = Self::connect(index_dir, false).await?;
        Ok(Self { pool })
    }

    async fn connect(index_dir: &Path, create: bool) -> Result<DbPool> {
        // Rollback journal keeps the catalog a single file, so the index
        // directory can be renamed as a unit
        let options = SqliteConnectOptions::new()
            .filename(index_dir.join(CATALOG_FILE))
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Delete);

        SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .context("Failed to create catalog connection pool")
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running catalog migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run catalog schema migration")?;

        debug!("Catalog migrations completed successfully");
        Ok(())
    }

    #[inline]
    pub async fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        MetadataQueries::set(&self.pool, key, value).await
    }

    #[inline]
    pub async fn metadata(&self, key: &str) -> Result<Option<String>> {
        MetadataQueries::get(&self.pool, key).await
    }

    /// Read a metadata value that must be present
    #[inline]
    pub async fn required_metadata(&self, key: &str) -> Result<String> {
        self.metadata(key)
            .await?
            .with_context(|| format!("Catalog has no '{key}' entry"))
    }

    #[inline]
    pub async fn record_documents(&self, documents: &[NewDocumentRecord]) -> Result<usize> {
        DocumentQueries::insert_batch(&self.pool, documents).await
    }

    #[inline]
    pub async fn documents(&self) -> Result<Vec<DocumentRecord>> {
        DocumentQueries::list_all(&self.pool).await
    }

    /// Close every pooled connection so the underlying file can be moved
    #[inline]
    pub async fn close(self) {
        self.pool.close().await;
    }
}
