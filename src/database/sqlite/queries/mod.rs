#[cfg(test)]
mod tests;

use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

pub struct MetadataQueries;

impl MetadataQueries {
    #[inline]
    pub async fn set(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO index_metadata (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to write index metadata '{key}'"))?;

        Ok(())
    }

    #[inline]
    pub async fn get(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM index_metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await
            .with_context(|| format!("Failed to read index metadata '{key}'"))?;

        Ok(value)
    }
}

pub struct DocumentQueries;

impl DocumentQueries {
    #[inline]
    pub async fn insert_batch(pool: &SqlitePool, documents: &[NewDocumentRecord]) -> Result<usize> {
        let mut transaction = pool
            .begin()
            .await
            .context("Failed to begin transaction for document insert")?;

        let now = Utc::now().naive_utc();

        for document in documents {
            sqlx::query(
                r#"
                INSERT INTO documents (position, title, body_length, chunk_count, fetched_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(document.position)
            .bind(&document.title)
            .bind(document.body_length)
            .bind(document.chunk_count)
            .bind(now)
            .execute(&mut *transaction)
            .await
            .with_context(|| format!("Failed to record document '{}'", document.title))?;
        }

        transaction
            .commit()
            .await
            .context("Failed to commit document records")?;

        debug!("Recorded {} documents in catalog", documents.len());
        Ok(documents.len())
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<DocumentRecord>> {
        let documents = sqlx::query_as::<_, DocumentRecord>(
            r#"
            SELECT position, title, body_length, chunk_count, fetched_at
            FROM documents ORDER BY position ASC
            "#,
        )
        .fetch_all(pool)
        .await
        .context("Failed to list documents")?;

        Ok(documents)
    }
}
