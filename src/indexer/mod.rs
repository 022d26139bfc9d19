// Indexer module
// Builds the vector index once from the configured articles, then reuses it


use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::database::lancedb::{ChunkMetadata, EmbeddingRecord};
use crate::database::sqlite::models::NewDocumentRecord;
use crate::embeddings::{ChunkingConfig, ContentChunk, Embedder, chunk_document, embedding_input};
use crate::index::{self, IndexStamp, StagedIndex, VectorIndex};
use crate::source::{Document, DocumentSource};
use crate::{RagError, Result};

/// Orchestrates fetching, chunking, embedding and persisting the index
pub struct IndexBuilder {
    location: PathBuf,
    titles: Vec<String>,
    suggest_alternate: bool,
    chunking: ChunkingConfig,
    source: Arc<dyn DocumentSource>,
    embedder: Arc<dyn Embedder>,
    show_progress: bool,
}

impl std::fmt::Debug for IndexBuilder {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexBuilder")
            .field("location", &self.location)
            .field("titles", &self.titles)
            .field("embedding_model", &self.embedder.model_id())
            .finish_non_exhaustive()
    }
}

impl IndexBuilder {
    #[inline]
    pub fn new(
        config: &Config,
        source: Arc<dyn DocumentSource>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            location: config.index_path(),
            titles: config.wikipedia.pages.clone(),
            suggest_alternate: config.wikipedia.auto_suggest,
            chunking: config.chunking.clone(),
            source,
            embedder,
            show_progress: false,
        }
    }

    /// Show a spinner on stderr while building, when attended
    #[inline]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    #[inline]
    pub fn location(&self) -> &Path {
        &self.location
    }

    #[inline]
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Load the persisted index, or build and persist it if none exists.
    ///
    /// An existing index is never rebuilt: loading performs no fetching or
    /// embedding, and a load failure is reported rather than repaired.
    #[inline]
    pub async fn build_or_load(&self) -> Result<VectorIndex> {
        if index::exists(&self.location) {
            info!("Loading existing index from {}", self.location.display());
            return VectorIndex::load(&self.location, Some(self.embedder.model_id())).await;
        }

        info!(
            "No index at {}, building from {} articles",
            self.location.display(),
            self.titles.len()
        );
        self.build().await
    }

    /// Build a fresh index from the source and persist it
    #[inline]
    pub async fn build(&self) -> Result<VectorIndex> {
        if let Err(e) = index::remove_stale_staging(&self.location, index::STALE_STAGING_AGE).await
        {
            warn!("Could not remove leftover staging directories: {}", e);
        }

        let bar = self.progress_bar();
        let result = self.build_with_progress(&bar).await;
        bar.finish_and_clear();
        result
    }

    async fn build_with_progress(&self, bar: &ProgressBar) -> Result<VectorIndex> {
        bar.set_message(format!("Fetching {} articles", self.titles.len()));
        let documents = self
            .source
            .fetch(&self.titles, self.suggest_alternate)
            .await?;
        verify_documents(&self.titles, &documents)?;

        let per_document: Vec<Vec<ContentChunk>> = documents
            .iter()
            .map(|document| chunk_document(document, &self.chunking))
            .collect();
        if let Some(document) = documents
            .iter()
            .zip(&per_document)
            .find_map(|(document, chunks)| chunks.is_empty().then_some(document))
        {
            return Err(RagError::SourceFetch {
                title: document.title.clone(),
                message: "page produced no text to index".to_string(),
            });
        }
        let chunks: Vec<&ContentChunk> = per_document.iter().flatten().collect();

        bar.set_message(format!("Embedding {} chunks", chunks.len()));
        let inputs: Vec<String> = chunks.iter().map(|chunk| embedding_input(chunk)).collect();
        let vectors = self.embedder.embed_batch(&inputs).await?;
        let dimension = verify_vectors(chunks.len(), &vectors)?;
        debug!(
            "Embedded {} chunks with {} dimensions",
            chunks.len(),
            dimension
        );

        bar.set_message("Writing index");
        let stamp = IndexStamp {
            embedding_model: self.embedder.model_id().to_string(),
            dimension,
        };
        let records = embedding_records(&chunks, vectors);
        let document_records = document_records(&documents, &per_document);

        let mut staged = StagedIndex::create(&self.location, stamp).await?;
        let written = match staged.insert(&records).await {
            Ok(()) => staged.record_documents(&document_records).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            staged.discard().await;
            return Err(e);
        }
        let index = staged.persist().await?;

        info!(
            "Index ready: {} documents, {} chunks",
            index.documents().len(),
            index.chunk_count()
        );

        Ok(index)
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.show_progress || !console::user_attended_stderr() {
            return ProgressBar::hidden();
        }

        let bar = ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    }
}

/// Check that the fetched documents match the requested titles one-to-one
fn verify_documents(titles: &[String], documents: &[Document]) -> Result<()> {
    for (position, title) in titles.iter().enumerate() {
        let Some(document) = documents.get(position) else {
            return Err(RagError::SourceFetch {
                title: title.clone(),
                message: "source returned no document".to_string(),
            });
        };

        if document.title != *title {
            return Err(RagError::SourceFetch {
                title: title.clone(),
                message: format!("source returned '{}' instead", document.title),
            });
        }

        if document.body.trim().is_empty() {
            return Err(RagError::SourceFetch {
                title: title.clone(),
                message: "page has no text".to_string(),
            });
        }
    }

    if let Some(extra) = documents.get(titles.len()) {
        return Err(RagError::SourceFetch {
            title: extra.title.clone(),
            message: "source returned a document that was not requested".to_string(),
        });
    }

    Ok(())
}

/// Check there is one vector per chunk, all of the same non-zero length.
/// Returns that length.
fn verify_vectors(chunk_count: usize, vectors: &[Vec<f32>]) -> Result<usize> {
    if vectors.len() != chunk_count {
        return Err(RagError::EmbeddingService(format!(
            "expected {chunk_count} embeddings, received {}",
            vectors.len()
        )));
    }

    let dimension = vectors.first().map_or(0, Vec::len);
    if dimension == 0 {
        return Err(RagError::EmbeddingService(
            "embedding service returned empty vectors".to_string(),
        ));
    }

    if let Some(vector) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(RagError::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }

    Ok(dimension)
}

fn embedding_records(chunks: &[&ContentChunk], vectors: Vec<Vec<f32>>) -> Vec<EmbeddingRecord> {
    chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| EmbeddingRecord {
            id: Uuid::new_v4().to_string(),
            vector,
            metadata: ChunkMetadata {
                document_title: chunk.document_title.clone(),
                heading_path: chunk.heading_path.clone(),
                content: chunk.content.clone(),
                chunk_index: chunk.chunk_index as u32,
                token_count: chunk.token_count as u32,
            },
        })
        .collect()
}

fn document_records(
    documents: &[Document],
    per_document: &[Vec<ContentChunk>],
) -> Vec<NewDocumentRecord> {
    documents
        .iter()
        .zip(per_document)
        .enumerate()
        .map(|(position, (document, chunks))| NewDocumentRecord {
            position: position as i64,
            title: document.title.clone(),
            body_length: document.body.len() as i64,
            chunk_count: chunks.len() as i64,
        })
        .collect()
}
