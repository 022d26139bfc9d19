use super::*;
use crate::database::lancedb::ChunkMetadata;
use tempfile::TempDir;

const MODEL: &str = "test-embedding-model";

fn stamp(dimension: usize) -> IndexStamp {
    IndexStamp {
        embedding_model: MODEL.to_string(),
        dimension,
    }
}

fn record(title: &str, chunk_index: u32, vector: Vec<f32>) -> EmbeddingRecord {
    EmbeddingRecord {
        id: format!("{title}#{chunk_index}"),
        vector,
        metadata: ChunkMetadata {
            document_title: title.to_string(),
            heading_path: format!("{title} > Overview"),
            content: format!("{title} chunk {chunk_index}"),
            chunk_index,
            token_count: 3,
        },
    }
}

fn documents(titles: &[&str]) -> Vec<NewDocumentRecord> {
    titles
        .iter()
        .enumerate()
        .map(|(position, title)| NewDocumentRecord {
            position: position as i64,
            title: (*title).to_string(),
            body_length: 100,
            chunk_count: 1,
        })
        .collect()
}

async fn persist_index(target: &Path, records: &[EmbeddingRecord]) -> VectorIndex {
    let dimension = records.first().map_or(2, |r| r.vector.len());
    let mut staged = StagedIndex::create(target, stamp(dimension))
        .await
        .expect("should stage index");
    staged.insert(records).await.expect("should insert records");
    let titles: Vec<&str> = records
        .iter()
        .map(|r| r.metadata.document_title.as_str())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    staged
        .record_documents(&documents(&titles))
        .await
        .expect("should record documents");
    staged.persist().await.expect("should persist index")
}

fn staging_dirs(parent: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(parent)
        .expect("should read dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.to_string_lossy().contains(STAGING_MARKER))
        .collect()
}

#[test]
fn staging_path_is_hidden_sibling() {
    let path = staging_path(Path::new("/data/wiki/index"));

    assert_eq!(path.parent(), Some(Path::new("/data/wiki")));
    let name = path
        .file_name()
        .expect("has file name")
        .to_string_lossy()
        .into_owned();
    assert!(name.starts_with(".index.staging-"));
}

#[test]
fn bare_relative_location_stages_in_current_dir() {
    assert_eq!(parent_dir(Path::new("index")), PathBuf::from("."));
    assert_eq!(parent_dir(Path::new("data/index")), PathBuf::from("data"));

    let path = staging_path(Path::new("index"));
    assert_eq!(path.parent(), Some(Path::new(".")));
}

#[tokio::test]
async fn staging_dirs_are_found_for_bare_relative_location() {
    let name = format!("wiki-rag-test-{}", uuid::Uuid::new_v4());
    let location = PathBuf::from(&name);
    let leftover = staging_path(&location);
    std::fs::create_dir_all(&leftover).expect("should create staging dir");

    let dirs = list_staging_dirs(&location).await;
    let removed = clear(&location).await;
    let _ = std::fs::remove_dir_all(&leftover);

    let dirs = dirs.expect("should read current dir");
    assert_eq!(dirs.len(), 1);
    assert!(removed.expect("should clear"));
    assert!(!leftover.exists());
}

#[test]
fn stamp_model_check() {
    let stamp = stamp(4);

    assert!(stamp.check_model(MODEL).is_ok());
    assert!(matches!(
        stamp.check_model("other-model"),
        Err(RagError::EmbeddingModelMismatch { indexed, configured })
            if indexed == MODEL && configured == "other-model"
    ));
}

#[tokio::test]
async fn persist_then_load_round_trips() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let target = temp_dir.path().join("index");
    let records = vec![
        record("Cats", 0, vec![1.0, 0.0]),
        record("Dogs", 0, vec![0.0, 1.0]),
    ];

    let persisted = persist_index(&target, &records).await;
    assert!(exists(&target));
    assert!(staging_dirs(temp_dir.path()).is_empty());
    assert_eq!(persisted.chunk_count(), 2);

    let loaded = VectorIndex::load(&target, Some(MODEL))
        .await
        .expect("should load index");
    assert_eq!(loaded.stamp(), &stamp(2));
    assert_eq!(loaded.chunk_count(), 2);
    assert_eq!(loaded.location(), target.as_path());
    assert!(!loaded.created_at().is_empty());
    let titles: Vec<&str> = loaded.documents().iter().map(|d| d.title.as_str()).collect();
    assert_eq!(titles, vec!["Cats", "Dogs"]);

    let before = persisted
        .nearest_neighbors(&[1.0, 0.1], 2)
        .await
        .expect("should search persisted index");
    let after = loaded
        .nearest_neighbors(&[1.0, 0.1], 2)
        .await
        .expect("should search loaded index");
    assert_eq!(before, after);
    assert_eq!(after[0].chunk.document_title, "Cats");
    assert_eq!(after[0].chunk.heading_path, "Cats > Overview");
}

#[tokio::test]
async fn load_with_other_model_fails() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let target = temp_dir.path().join("index");
    persist_index(&target, &[record("Cats", 0, vec![1.0, 0.0])]).await;

    let result = VectorIndex::load(&target, Some("another-model")).await;

    assert!(matches!(
        result,
        Err(RagError::EmbeddingModelMismatch { .. })
    ));
}

#[tokio::test]
async fn directory_without_catalog_is_corrupt() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let target = temp_dir.path().join("index");
    std::fs::create_dir_all(&target).expect("should create dir");

    let result = VectorIndex::load(&target, Some(MODEL)).await;

    assert!(matches!(result, Err(RagError::IndexCorrupt { .. })));
}

#[tokio::test]
async fn missing_vectors_are_corrupt() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let target = temp_dir.path().join("index");
    persist_index(&target, &[record("Cats", 0, vec![1.0, 0.0])]).await;
    std::fs::remove_dir_all(target.join(VECTORS_DIR)).expect("should remove vectors");

    let result = VectorIndex::load(&target, Some(MODEL)).await;

    assert!(matches!(result, Err(RagError::IndexCorrupt { .. })));
}

#[tokio::test]
async fn query_dimension_is_checked() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let index = persist_index(
        &temp_dir.path().join("index"),
        &[record("Cats", 0, vec![1.0, 0.0])],
    )
    .await;

    let result = index.nearest_neighbors(&[1.0, 0.0, 0.0], 1).await;

    assert!(matches!(
        result,
        Err(RagError::DimensionMismatch {
            expected: 2,
            actual: 3
        })
    ));
}

#[tokio::test]
async fn losing_the_rename_race_loads_existing_index() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let target = temp_dir.path().join("index");

    let mut late = StagedIndex::create(&target, stamp(2))
        .await
        .expect("should stage index");
    late.insert(&[
        record("Late", 0, vec![1.0, 0.0]),
        record("Late", 1, vec![0.0, 1.0]),
    ])
    .await
    .expect("should insert");

    persist_index(&target, &[record("Early", 0, vec![1.0, 0.0])]).await;

    let index = late.persist().await.expect("should load the winner");
    assert_eq!(index.chunk_count(), 1);
    assert!(staging_dirs(temp_dir.path()).is_empty());
}

#[tokio::test]
async fn discard_removes_staging() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let target = temp_dir.path().join("index");

    let staged = StagedIndex::create(&target, stamp(2))
        .await
        .expect("should stage index");
    assert!(staged.staging_path().is_dir());

    staged.discard().await;

    assert!(staging_dirs(temp_dir.path()).is_empty());
    assert!(!exists(&target));
}

#[tokio::test]
async fn clear_removes_index_and_stale_staging() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let target = temp_dir.path().join("index");
    persist_index(&target, &[record("Cats", 0, vec![1.0, 0.0])]).await;
    let stale = temp_dir.path().join(".index.staging-crashed");
    std::fs::create_dir_all(&stale).expect("should create stale dir");
    let unrelated = temp_dir.path().join("config.toml");
    std::fs::write(&unrelated, "").expect("should write file");

    assert!(clear(&target).await.expect("should clear"));

    assert!(!exists(&target));
    assert!(!stale.exists());
    assert!(unrelated.exists());
    assert!(!clear(&target).await.expect("second clear succeeds"));
}

#[tokio::test]
async fn stale_staging_is_removed_by_age() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let target = temp_dir.path().join("index");
    let leftover = temp_dir.path().join(".index.staging-crashed");
    std::fs::create_dir_all(leftover.join(VECTORS_DIR)).expect("should create leftover dir");
    let unrelated = temp_dir.path().join(".other.staging-crashed");
    std::fs::create_dir_all(&unrelated).expect("should create unrelated dir");

    let removed = remove_stale_staging(&target, STALE_STAGING_AGE)
        .await
        .expect("should scan staging dirs");
    assert_eq!(removed, 0);
    assert!(leftover.is_dir());

    let removed = remove_stale_staging(&target, Duration::ZERO)
        .await
        .expect("should scan staging dirs");
    assert_eq!(removed, 1);
    assert!(!leftover.exists());
    assert!(unrelated.is_dir());
}
