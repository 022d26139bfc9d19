// Index module
// A persisted vector index: LanceDB chunk vectors plus a SQLite catalog,
// written through a staging directory and renamed into place

#[cfg(test)]
mod tests;

use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::database::lancedb::EmbeddingRecord;
use crate::database::lancedb::vector_store::{SearchResult, VectorStore};
use crate::database::sqlite::Catalog;
use crate::database::sqlite::models::{DocumentRecord, NewDocumentRecord, metadata_keys};
use crate::embeddings::ContentChunk;
use crate::{RagError, Result};

/// Layout version written into every catalog
pub const INDEX_FORMAT_VERSION: &str = "1";

/// Directory holding the LanceDB database inside an index directory
pub const VECTORS_DIR: &str = "vectors";

/// Staging directories untouched for this long belong to a crashed build
pub const STALE_STAGING_AGE: Duration = Duration::from_secs(60 * 60);

const STAGING_MARKER: &str = ".staging-";

/// The embedding model and vector length an index was built with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStamp {
    pub embedding_model: String,
    pub dimension: usize,
}

impl IndexStamp {
    /// Fail unless this index was built by `configured_model`
    #[inline]
    pub fn check_model(&self, configured_model: &str) -> Result<()> {
        if self.embedding_model == configured_model {
            Ok(())
        } else {
            Err(RagError::EmbeddingModelMismatch {
                indexed: self.embedding_model.clone(),
                configured: configured_model.to_string(),
            })
        }
    }
}

/// A retrieved chunk with its cosine similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: ContentChunk,
    pub score: f32,
}

impl From<SearchResult> for ScoredChunk {
    #[inline]
    fn from(result: SearchResult) -> Self {
        let metadata = result.chunk_metadata;
        Self {
            chunk: ContentChunk {
                document_title: metadata.document_title,
                heading_path: metadata.heading_path,
                content: metadata.content,
                chunk_index: metadata.chunk_index as usize,
                token_count: metadata.token_count as usize,
            },
            score: result.similarity_score,
        }
    }
}

/// A loaded, read-only index
#[derive(Debug)]
pub struct VectorIndex {
    location: PathBuf,
    stamp: IndexStamp,
    created_at: String,
    documents: Vec<DocumentRecord>,
    chunk_count: usize,
    store: VectorStore,
}

impl VectorIndex {
    /// Load the index persisted at `location`.
    ///
    /// Any unreadable or inconsistent part is reported as `IndexCorrupt`.
    /// When `expected_model` is given, an index stamped with a different
    /// embedding model fails with `EmbeddingModelMismatch`.
    #[inline]
    pub async fn load(location: &Path, expected_model: Option<&str>) -> Result<Self> {
        let corrupt = |message: String| RagError::IndexCorrupt {
            path: location.to_path_buf(),
            message,
        };

        if !location.is_dir() {
            return Err(corrupt("index directory does not exist".to_string()));
        }

        let catalog = Catalog::open_existing(location)
            .await
            .map_err(|e| corrupt(format!("{e:#}")))?;
        let catalog_contents = read_catalog(&catalog).await;
        catalog.close().await;
        let (stamp, chunk_count, created_at, documents) =
            catalog_contents.map_err(|e| corrupt(format!("{e:#}")))?;

        if let Some(model) = expected_model {
            stamp.check_model(model)?;
        }

        let store = VectorStore::open(&location.join(VECTORS_DIR))
            .await
            .map_err(|e| corrupt(e.to_string()))?;

        if store.dimension() != stamp.dimension {
            return Err(corrupt(format!(
                "vector table has {} dimensions but the catalog records {}",
                store.dimension(),
                stamp.dimension
            )));
        }

        let stored = store
            .count_embeddings()
            .await
            .map_err(|e| corrupt(e.to_string()))?;
        if stored != chunk_count {
            return Err(corrupt(format!(
                "vector table holds {stored} chunks but the catalog records {chunk_count}"
            )));
        }

        info!(
            "Loaded index from {} ({} documents, {} chunks, model {})",
            location.display(),
            documents.len(),
            chunk_count,
            stamp.embedding_model
        );

        Ok(Self {
            location: location.to_path_buf(),
            stamp,
            created_at,
            documents,
            chunk_count,
            store,
        })
    }

    /// Return the `k` chunks most similar to `query`, best first
    #[inline]
    pub async fn nearest_neighbors(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if query.len() != self.stamp.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.stamp.dimension,
                actual: query.len(),
            });
        }

        let results = self
            .store
            .search_similar(query, k)
            .await
            .map_err(|e| match e {
                RagError::Database(message) => RagError::Retrieval(message),
                other => other,
            })?;

        Ok(results.into_iter().map(ScoredChunk::from).collect())
    }

    #[inline]
    pub fn location(&self) -> &Path {
        &self.location
    }

    #[inline]
    pub fn stamp(&self) -> &IndexStamp {
        &self.stamp
    }

    #[inline]
    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    #[inline]
    pub fn documents(&self) -> &[DocumentRecord] {
        &self.documents
    }

    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }
}

type CatalogContents = (IndexStamp, usize, String, Vec<DocumentRecord>);

async fn read_catalog(catalog: &Catalog) -> anyhow::Result<CatalogContents> {
    use anyhow::Context;

    let version = catalog
        .required_metadata(metadata_keys::FORMAT_VERSION)
        .await?;
    if version != INDEX_FORMAT_VERSION {
        anyhow::bail!("unsupported index format version {version}");
    }

    let embedding_model = catalog
        .required_metadata(metadata_keys::EMBEDDING_MODEL)
        .await?;
    let dimension = catalog
        .required_metadata(metadata_keys::EMBEDDING_DIMENSION)
        .await?
        .parse::<usize>()
        .context("invalid embedding dimension")?;
    let chunk_count = catalog
        .required_metadata(metadata_keys::CHUNK_COUNT)
        .await?
        .parse::<usize>()
        .context("invalid chunk count")?;
    let created_at = catalog
        .required_metadata(metadata_keys::CREATED_AT)
        .await?;
    let documents = catalog.documents().await?;

    Ok((
        IndexStamp {
            embedding_model,
            dimension,
        },
        chunk_count,
        created_at,
        documents,
    ))
}

/// Removes a staging directory when dropped unless it was renamed into place
#[derive(Debug)]
struct StagingDir {
    path: PathBuf,
    renamed: bool,
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if self.renamed {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed staging directory {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove staging directory {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// An index being written next to its final location.
///
/// Nothing is visible at the target until [`StagedIndex::persist`] renames
/// the staging directory into place. Dropping a staged index removes it.
#[derive(Debug)]
pub struct StagedIndex {
    target: PathBuf,
    staging: StagingDir,
    catalog: Catalog,
    store: VectorStore,
    stamp: IndexStamp,
    chunk_count: usize,
}

impl StagedIndex {
    #[inline]
    pub async fn create(target: &Path, stamp: IndexStamp) -> Result<Self> {
        let staging = StagingDir {
            path: staging_path(target),
            renamed: false,
        };
        debug!("Staging index in {}", staging.path.display());

        let catalog = Catalog::create(&staging.path)
            .await
            .map_err(|e| RagError::Database(format!("{e:#}")))?;
        let store = VectorStore::create(&staging.path.join(VECTORS_DIR), stamp.dimension).await?;

        Ok(Self {
            target: target.to_path_buf(),
            staging,
            catalog,
            store,
            stamp,
            chunk_count: 0,
        })
    }

    #[inline]
    pub fn staging_path(&self) -> &Path {
        &self.staging.path
    }

    /// Append chunk vectors
    #[inline]
    pub async fn insert(&mut self, records: &[EmbeddingRecord]) -> Result<()> {
        self.store.insert_batch(records).await?;
        self.chunk_count += records.len();
        Ok(())
    }

    /// Record the documents the index was built from
    #[inline]
    pub async fn record_documents(&self, documents: &[NewDocumentRecord]) -> Result<()> {
        self.catalog
            .record_documents(documents)
            .await
            .map_err(|e| RagError::Database(format!("{e:#}")))?;
        Ok(())
    }

    /// Write the stamp, move the index onto its target and load it from there.
    ///
    /// If another writer already persisted an index at the target, this copy
    /// is discarded and the existing index is loaded instead.
    #[inline]
    pub async fn persist(self) -> Result<VectorIndex> {
        let Self {
            target,
            mut staging,
            catalog,
            store,
            stamp,
            chunk_count,
        } = self;

        let stamped = write_stamp(&catalog, &stamp, chunk_count).await;
        catalog.close().await;
        store.close();
        stamped.map_err(|e| RagError::Database(format!("{e:#}")))?;

        match tokio::fs::rename(&staging.path, &target).await {
            Ok(()) => {
                staging.renamed = true;
                info!(
                    "Persisted index with {} chunks to {}",
                    chunk_count,
                    target.display()
                );
            }
            Err(e) if target.is_dir() => {
                info!(
                    "Index at {} was persisted concurrently ({}), using it",
                    target.display(),
                    e
                );
                drop(staging);
            }
            Err(e) => return Err(RagError::Io(e)),
        }

        VectorIndex::load(&target, Some(&stamp.embedding_model)).await
    }

    /// Abandon the staged index, removing everything it wrote
    #[inline]
    pub async fn discard(self) {
        let Self {
            staging,
            catalog,
            store,
            ..
        } = self;
        catalog.close().await;
        store.close();
        drop(staging);
    }
}

async fn write_stamp(
    catalog: &Catalog,
    stamp: &IndexStamp,
    chunk_count: usize,
) -> anyhow::Result<()> {
    catalog
        .set_metadata(metadata_keys::FORMAT_VERSION, INDEX_FORMAT_VERSION)
        .await?;
    catalog
        .set_metadata(metadata_keys::EMBEDDING_MODEL, &stamp.embedding_model)
        .await?;
    catalog
        .set_metadata(
            metadata_keys::EMBEDDING_DIMENSION,
            &stamp.dimension.to_string(),
        )
        .await?;
    catalog
        .set_metadata(metadata_keys::CHUNK_COUNT, &chunk_count.to_string())
        .await?;
    catalog
        .set_metadata(metadata_keys::CREATED_AT, &Utc::now().to_rfc3339())
        .await
}

fn index_name(target: &Path) -> String {
    target
        .file_name()
        .map_or_else(|| "index".to_string(), |n| n.to_string_lossy().into_owned())
}

fn staging_prefix(target: &Path) -> String {
    format!(".{}{STAGING_MARKER}", index_name(target))
}

/// Directory holding `location`; `.` for a bare relative name
fn parent_dir(location: &Path) -> PathBuf {
    match location.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn staging_path(target: &Path) -> PathBuf {
    parent_dir(target).join(format!("{}{}", staging_prefix(target), uuid::Uuid::new_v4()))
}

/// Staging directories of `location`'s index present beside it
async fn list_staging_dirs(location: &Path) -> Result<Vec<PathBuf>> {
    let parent = parent_dir(location);
    if !parent.is_dir() {
        return Ok(Vec::new());
    }

    let prefix = staging_prefix(location);
    let mut dirs = Vec::new();
    let mut entries = tokio::fs::read_dir(&parent).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name().to_string_lossy().starts_with(&prefix) {
            dirs.push(entry.path());
        }
    }

    Ok(dirs)
}

/// Whether an index has been persisted at `location`
#[inline]
pub fn exists(location: &Path) -> bool {
    location.is_dir()
}

/// Delete the index at `location` and any staging directories left beside it.
///
/// Returns whether anything was removed.
#[inline]
pub async fn clear(location: &Path) -> Result<bool> {
    let mut removed = false;

    if location.is_dir() {
        tokio::fs::remove_dir_all(location).await?;
        info!("Removed index at {}", location.display());
        removed = true;
    }

    for dir in list_staging_dirs(location).await? {
        tokio::fs::remove_dir_all(&dir).await?;
        info!("Removed stale staging directory {}", dir.display());
        removed = true;
    }

    Ok(removed)
}

/// Delete staging directories beside `location` that were last modified at
/// least `max_age` ago. Younger ones may belong to a build in progress and
/// are left alone.
///
/// Returns how many were removed.
#[inline]
pub async fn remove_stale_staging(location: &Path, max_age: Duration) -> Result<usize> {
    let mut removed = 0;

    for dir in list_staging_dirs(location).await? {
        let age = match tokio::fs::metadata(&dir).await.and_then(|m| m.modified()) {
            Ok(modified) => modified.elapsed().unwrap_or(Duration::ZERO),
            Err(e) => {
                warn!("Could not read age of {}: {}", dir.display(), e);
                continue;
            }
        };
        if age < max_age {
            debug!("Keeping recent staging directory {}", dir.display());
            continue;
        }

        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!(
                    "Removed staging directory {} left by an unfinished build",
                    dir.display()
                );
                removed += 1;
            }
            Err(e) => warn!("Failed to remove staging directory {}: {}", dir.display(), e),
        }
    }

    Ok(removed)
}
