use super::*;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tempfile::TempDir;

async fn create_test_pool() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(&db_path)
                .create_if_missing(true),
        )
        .await
        .expect("Failed to create test pool");

    sqlx::raw_sql(include_str!("../migrations/0001_catalog.sql"))
        .execute(&pool)
        .await
        .expect("Failed to run migrations");

    (temp_dir, pool)
}

fn new_document(position: i64, title: &str, chunk_count: i64) -> NewDocumentRecord {
    NewDocumentRecord {
        position,
        title: title.to_string(),
        body_length: 100 * (position + 1),
        chunk_count,
    }
}

#[tokio::test]
async fn metadata_set_and_get() {
    let (_temp_dir, pool) = create_test_pool().await;

    assert_eq!(
        MetadataQueries::get(&pool, metadata_keys::EMBEDDING_MODEL)
            .await
            .expect("Failed to read metadata"),
        None
    );

    MetadataQueries::set(&pool, metadata_keys::EMBEDDING_MODEL, "model-a")
        .await
        .expect("Failed to write metadata");
    MetadataQueries::set(&pool, metadata_keys::EMBEDDING_MODEL, "model-b")
        .await
        .expect("Failed to overwrite metadata");

    let value = MetadataQueries::get(&pool, metadata_keys::EMBEDDING_MODEL)
        .await
        .expect("Failed to read metadata");
    assert_eq!(value.as_deref(), Some("model-b"));

    let other = MetadataQueries::get(&pool, metadata_keys::CHUNK_COUNT)
        .await
        .expect("Failed to read metadata");
    assert_eq!(other, None);
}

#[tokio::test]
async fn documents_are_listed_in_position_order() {
    let (_temp_dir, pool) = create_test_pool().await;

    let inserted = DocumentQueries::insert_batch(
        &pool,
        &[
            new_document(1, "Dogs", 2),
            new_document(0, "Cats", 3),
        ],
    )
    .await
    .expect("Failed to insert documents");
    assert_eq!(inserted, 2);

    let documents = DocumentQueries::list_all(&pool)
        .await
        .expect("Failed to list documents");
    let titles: Vec<&str> = documents.iter().map(|d| d.title.as_str()).collect();
    assert_eq!(titles, vec!["Cats", "Dogs"]);
    let chunk_counts: Vec<i64> = documents.iter().map(|d| d.chunk_count).collect();
    assert_eq!(chunk_counts, vec![3, 2]);
}

#[tokio::test]
async fn duplicate_titles_roll_back_the_batch() {
    let (_temp_dir, pool) = create_test_pool().await;

    let result = DocumentQueries::insert_batch(
        &pool,
        &[new_document(0, "Cats", 1), new_document(1, "Cats", 1)],
    )
    .await;
    assert!(result.is_err());

    let documents = DocumentQueries::list_all(&pool)
        .await
        .expect("Failed to list documents");
    assert!(documents.is_empty());
}
