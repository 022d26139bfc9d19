// Generation module
// The answer provider seam and the question-answering prompt

#[cfg(test)]
mod tests;

use async_trait::async_trait;

use crate::Result;
use crate::index::ScoredChunk;

/// Sampling temperature used for every answer
pub const ANSWER_TEMPERATURE: f32 = 0.0;

const CONTEXT_DELIMITER: &str = "---------------------";

/// Produces a text answer for a prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_id(&self) -> &str;

    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String>;
}

/// Build the question-answering prompt from a question and its retrieved context.
///
/// Chunks appear in the order given, each preceded by a `source:` line naming
/// the section it came from.
#[inline]
pub fn build_prompt(question: &str, context: &[ScoredChunk]) -> String {
    let context_block = context
        .iter()
        .map(|scored| {
            format!(
                "source: {}\n{}",
                scored.chunk.heading_path,
                scored.chunk.content.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Context information is below.\n\
         {CONTEXT_DELIMITER}\n\
         {context_block}\n\
         {CONTEXT_DELIMITER}\n\
         Given the context information and not prior knowledge, answer the query.\n\
         Query: {}\n\
         Answer: ",
        question.trim()
    )
}
