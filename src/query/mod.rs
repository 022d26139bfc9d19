// Query module
// Answers a question from the chunks of the index closest to it


use std::sync::Arc;

use tracing::{debug, info};

use crate::embeddings::Embedder;
use crate::generation::{ANSWER_TEMPERATURE, Generator, build_prompt};
use crate::index::{ScoredChunk, VectorIndex};
use crate::{RagError, Result};

/// Number of chunks retrieved per question unless configured otherwise
pub const DEFAULT_TOP_K: usize = 3;

/// A generated answer and the retrieved context it was conditioned on
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub context: Vec<ScoredChunk>,
}

impl Answer {
    /// The raw text of each retrieved chunk, best match first
    #[inline]
    pub fn context_texts(&self) -> Vec<&str> {
        self.context
            .iter()
            .map(|scored| scored.chunk.content.as_str())
            .collect()
    }
}

/// Retrieval and answer generation over a loaded index
pub struct QueryEngine {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    top_k: usize,
}

impl std::fmt::Debug for QueryEngine {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("index", &self.index.location())
            .field("embedding_model", &self.embedder.model_id())
            .field("generation_model", &self.generator.model_id())
            .field("top_k", &self.top_k)
            .finish()
    }
}

impl QueryEngine {
    /// Create an engine over `index`.
    ///
    /// The embedder must be the model the index was built with.
    #[inline]
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        top_k: usize,
    ) -> Result<Self> {
        index.stamp().check_model(embedder.model_id())?;
        if top_k == 0 {
            return Err(RagError::Config("top_k must be at least 1".to_string()));
        }

        Ok(Self {
            index,
            embedder,
            generator,
            top_k,
        })
    }

    #[inline]
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    #[inline]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Answer a question using the configured number of context chunks
    #[inline]
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        self.answer_with_top_k(question, self.top_k).await
    }

    /// Answer a question using the `top_k` most similar chunks
    #[inline]
    pub async fn answer_with_top_k(&self, question: &str, top_k: usize) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidQuestion(
                "question must not be blank".to_string(),
            ));
        }
        if top_k == 0 {
            return Err(RagError::InvalidQuestion(
                "at least one context chunk must be retrieved".to_string(),
            ));
        }

        debug!("Embedding question ({} chars)", question.len());
        let query_vector = self.embedder.embed(question).await?;

        let context = self.index.nearest_neighbors(&query_vector, top_k).await?;
        if context.is_empty() {
            return Err(RagError::EmptyIndex);
        }
        debug!(
            "Retrieved {} chunks, best score {:.3}",
            context.len(),
            context.first().map_or(0.0, |c| c.score)
        );

        let prompt = build_prompt(question, &context);
        let text = self.generator.generate(&prompt, ANSWER_TEMPERATURE).await?;

        info!(
            "Answered question with {} context chunks using {}",
            context.len(),
            self.generator.model_id()
        );

        Ok(Answer { text, context })
    }
}
