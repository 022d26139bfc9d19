#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

//! Integration tests for answering questions over a built index

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Result;
use tempfile::TempDir;

use common::{EchoGenerator, FakeSource, HashEmbedder, pet_pages, test_config};
use wiki_rag::RagError;
use wiki_rag::indexer::IndexBuilder;
use wiki_rag::query::{DEFAULT_TOP_K, QueryEngine};

struct Fixture {
    _temp_dir: TempDir,
    engine: QueryEngine,
    embedder: Arc<HashEmbedder>,
    generator: Arc<EchoGenerator>,
}

async fn fixture(top_k: usize) -> Result<Fixture> {
    let temp_dir = TempDir::new()?;
    let config = test_config(temp_dir.path(), &["Cats", "Dogs"]);
    let embedder = Arc::new(HashEmbedder::new());
    let generator = Arc::new(EchoGenerator::default());
    let index = IndexBuilder::new(
        &config,
        Arc::new(FakeSource::new(&pet_pages())),
        Arc::clone(&embedder) as _,
    )
    .build_or_load()
    .await?;

    let engine = QueryEngine::new(
        Arc::new(index),
        Arc::clone(&embedder) as _,
        Arc::clone(&generator) as _,
        top_k,
    )?;

    Ok(Fixture {
        _temp_dir: temp_dir,
        engine,
        embedder,
        generator,
    })
}

#[tokio::test]
async fn answer_is_grounded_in_retrieved_articles() -> Result<()> {
    let fixture = fixture(DEFAULT_TOP_K).await?;

    let answer = fixture.engine.answer("What kind of animals are cats and dogs?").await?;

    assert!(!answer.context.is_empty());
    assert!(answer.context.len() <= DEFAULT_TOP_K);
    assert!(answer.text.contains("mammals"));
    assert!(answer.text.contains("Query: What kind of animals are cats and dogs?"));
    for text in answer.context_texts() {
        assert!(answer.text.contains(text.trim()));
    }

    Ok(())
}

#[tokio::test]
async fn same_question_gives_same_context_and_prompt() -> Result<()> {
    let fixture = fixture(2).await?;

    let first = fixture.engine.answer("Do dogs bark?").await?;
    let second = fixture.engine.answer("  Do dogs bark?  ").await?;

    assert_eq!(first, second);
    assert_eq!(first.context[0].chunk.document_title, "Dogs");

    Ok(())
}

#[tokio::test]
async fn generation_runs_at_zero_temperature() -> Result<()> {
    let fixture = fixture(DEFAULT_TOP_K).await?;

    fixture.engine.answer("Do cats purr?").await?;
    fixture.engine.answer_with_top_k("Do cats purr?", 1).await?;

    let temperatures = fixture
        .generator
        .temperatures
        .lock()
        .expect("temperature log lock")
        .clone();
    assert_eq!(temperatures, vec![0.0, 0.0]);

    Ok(())
}

#[tokio::test]
async fn explicit_top_k_limits_context() -> Result<()> {
    let fixture = fixture(DEFAULT_TOP_K).await?;

    let answer = fixture.engine.answer_with_top_k("cats", 1).await?;

    assert_eq!(answer.context.len(), 1);
    assert_eq!(answer.context[0].chunk.document_title, "Cats");

    Ok(())
}

#[tokio::test]
async fn blank_question_is_rejected_before_any_service_call() -> Result<()> {
    let fixture = fixture(DEFAULT_TOP_K).await?;
    let embeds_before = fixture.embedder.embed_calls.load(Ordering::SeqCst);

    for question in ["", "   ", "\n\t"] {
        let result = fixture.engine.answer(question).await;
        assert!(matches!(result, Err(RagError::InvalidQuestion(_))));
    }

    assert_eq!(fixture.embedder.embed_calls.load(Ordering::SeqCst), embeds_before);
    assert_eq!(fixture.generator.calls.load(Ordering::SeqCst), 0);

    Ok(())
}

#[tokio::test]
async fn generation_failure_does_not_poison_the_engine() -> Result<()> {
    let fixture = fixture(DEFAULT_TOP_K).await?;
    fixture.generator.fail_next();

    let failed = fixture.engine.answer("Do cats purr?").await;
    assert!(matches!(failed, Err(RagError::GenerationService(_))));

    let answer = fixture.engine.answer("Do cats purr?").await?;
    assert!(answer.text.contains("purr"));
    assert_eq!(fixture.generator.calls.load(Ordering::SeqCst), 2);

    Ok(())
}

#[tokio::test]
async fn engine_rejects_a_different_embedding_model() -> Result<()> {
    let fixture = fixture(DEFAULT_TOP_K).await?;

    let result = QueryEngine::new(
        Arc::clone(fixture.engine.index()),
        Arc::new(HashEmbedder::with_model("other-model")),
        Arc::clone(&fixture.generator) as _,
        DEFAULT_TOP_K,
    );

    assert!(matches!(
        result,
        Err(RagError::EmbeddingModelMismatch { .. })
    ));

    Ok(())
}
