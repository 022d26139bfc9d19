// Session module
// Lazily builds the index and query engine at most once per session


use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::embeddings::Embedder;
use crate::generation::Generator;
use crate::index::{self, VectorIndex};
use crate::indexer::IndexBuilder;
use crate::query::{Answer, QueryEngine};
use crate::{RagError, Result};

type SharedBuild = Shared<BoxFuture<'static, std::result::Result<Arc<VectorIndex>, Arc<RagError>>>>;

/// Where the session's index is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Uninitialized,
    Building,
    Ready,
    Failed,
}

impl std::fmt::Display for CacheStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            CacheStatus::Uninitialized => write!(f, "Not loaded"),
            CacheStatus::Building => write!(f, "Building"),
            CacheStatus::Ready => write!(f, "Ready"),
            CacheStatus::Failed => write!(f, "Failed"),
        }
    }
}

enum IndexState {
    Uninitialized,
    Building(SharedBuild),
    Ready(Arc<VectorIndex>),
    Failed(Arc<RagError>),
}

/// Holds the lazily built index and query engine for one application run.
///
/// Concurrent first callers share one in-flight build. A failed build is
/// kept as `Failed` and retried by the next caller. Clearing the persisted
/// index does not reset what this session has already loaded.
pub struct Session {
    builder: Arc<IndexBuilder>,
    generator: Arc<dyn Generator>,
    top_k: usize,
    state: Mutex<IndexState>,
    engine: OnceCell<Arc<QueryEngine>>,
}

impl std::fmt::Debug for Session {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("index_location", &self.builder.location())
            .field("status", &self.status())
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

impl Session {
    #[inline]
    pub fn new(builder: IndexBuilder, generator: Arc<dyn Generator>, top_k: usize) -> Self {
        Self {
            builder: Arc::new(builder),
            generator,
            top_k,
            state: Mutex::new(IndexState::Uninitialized),
            engine: OnceCell::new(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, IndexState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub fn status(&self) -> CacheStatus {
        let state = self.lock_state();
        match *state {
            IndexState::Uninitialized => CacheStatus::Uninitialized,
            IndexState::Building(_) => CacheStatus::Building,
            IndexState::Ready(_) => CacheStatus::Ready,
            IndexState::Failed(_) => CacheStatus::Failed,
        }
    }

    /// The error of the last failed build, until a retry starts
    #[inline]
    pub fn last_error(&self) -> Option<Arc<RagError>> {
        let state = self.lock_state();
        match &*state {
            IndexState::Failed(error) => Some(Arc::clone(error)),
            _ => None,
        }
    }

    #[inline]
    pub fn index_location(&self) -> &Path {
        self.builder.location()
    }

    /// The session's index, loading or building it on first use.
    ///
    /// Failures of a shared build are reported as `RagError::BuildFailed`.
    #[inline]
    pub async fn index(&self) -> Result<Arc<VectorIndex>> {
        let build = {
            let mut state = self.lock_state();
            match &*state {
                IndexState::Ready(index) => return Ok(Arc::clone(index)),
                IndexState::Building(build) => build.clone(),
                IndexState::Uninitialized | IndexState::Failed(_) => {
                    debug!("Starting index build");
                    let build = self.start_build();
                    *state = IndexState::Building(build.clone());
                    build
                }
            }
        };

        let result = build.clone().await;

        {
            let mut state = self.lock_state();
            // Only the build still on record may settle the state
            let settles = matches!(
                &*state,
                IndexState::Building(current) if Shared::ptr_eq(current, &build)
            );
            if settles {
                *state = match &result {
                    Ok(index) => IndexState::Ready(Arc::clone(index)),
                    Err(error) => {
                        warn!("Index build failed: {}", error);
                        IndexState::Failed(Arc::clone(error))
                    }
                };
            }
        }

        result.map_err(RagError::BuildFailed)
    }

    fn start_build(&self) -> SharedBuild {
        let builder = Arc::clone(&self.builder);
        async move { builder.build_or_load().await.map(Arc::new).map_err(Arc::new) }
            .boxed()
            .shared()
    }

    /// The query engine over the session's index, created once
    #[inline]
    pub async fn query_engine(&self) -> Result<Arc<QueryEngine>> {
        self.engine
            .get_or_try_init(|| async {
                let index = self.index().await?;
                let engine = QueryEngine::new(
                    index,
                    Arc::clone(self.builder.embedder()),
                    Arc::clone(&self.generator),
                    self.top_k,
                )?;
                Ok(Arc::new(engine))
            })
            .await
            .map(Arc::clone)
    }

    /// Answer a question with the session's query engine
    #[inline]
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        if question.trim().is_empty() {
            return Err(RagError::InvalidQuestion(
                "question must not be blank".to_string(),
            ));
        }

        self.query_engine().await?.answer(question).await
    }

    /// Answer a question with an explicit number of context chunks
    #[inline]
    pub async fn ask_with_top_k(&self, question: &str, top_k: usize) -> Result<Answer> {
        if question.trim().is_empty() {
            return Err(RagError::InvalidQuestion(
                "question must not be blank".to_string(),
            ));
        }

        self.query_engine()
            .await?
            .answer_with_top_k(question, top_k)
            .await
    }

    /// Delete the persisted index and any leftover staging directories.
    ///
    /// An index already loaded by this session stays in use; a new session
    /// picks up the rebuilt index.
    #[inline]
    pub async fn clear_index(&self) -> Result<bool> {
        let removed = index::clear(self.builder.location()).await?;
        if removed {
            info!(
                "Cleared index at {}; this session keeps its loaded copy",
                self.builder.location().display()
            );
        }
        Ok(removed)
    }
}
