#![allow(
    dead_code,
    reason = "each integration test crate uses a different subset of the fakes"
)]

//! Test doubles shared by the integration tests

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use wiki_rag::config::Config;
use wiki_rag::embeddings::Embedder;
use wiki_rag::generation::Generator;
use wiki_rag::source::{Document, DocumentSource};
use wiki_rag::{RagError, Result};

pub const HASH_DIMENSION: usize = 64;
pub const HASH_MODEL: &str = "hash-embedder-v1";

/// Bag-of-words embedder: each lowercase word is hashed into one of 64 buckets
pub struct HashEmbedder {
    model: String,
    fail_batches: AtomicBool,
    fail_next_embed: AtomicBool,
    pub embed_calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
    pub embedded_texts: AtomicUsize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self::with_model(HASH_MODEL)
    }

    pub fn with_model(model: &str) -> Self {
        Self {
            model: model.to_string(),
            fail_batches: AtomicBool::new(false),
            fail_next_embed: AtomicBool::new(false),
            embed_calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
            embedded_texts: AtomicUsize::new(0),
        }
    }

    /// Make every batch call fail until set back to `false`
    pub fn fail_batches(&self, fail: bool) {
        self.fail_batches.store(fail, Ordering::SeqCst);
    }

    /// Make the next single-text call fail
    pub fn fail_next_embed(&self) {
        self.fail_next_embed.store(true, Ordering::SeqCst);
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; HASH_DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            let hash = word
                .bytes()
                .fold(0xcbf2_9ce4_8422_2325_u64, |acc, b| {
                    (acc ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
                });
            vector[(hash % HASH_DIMENSION as u64) as usize] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        } else {
            vector[0] = 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_embed.swap(false, Ordering::SeqCst) {
            return Err(RagError::EmbeddingService(
                "injected embedding failure".to_string(),
            ));
        }
        Ok(Self::vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_batches.load(Ordering::SeqCst) {
            return Err(RagError::EmbeddingService(
                "injected batch embedding failure".to_string(),
            ));
        }
        self.embedded_texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// In-memory article source with a fetch counter and injectable failures
pub struct FakeSource {
    pages: HashMap<String, String>,
    failing: Mutex<HashSet<String>>,
    delay: Duration,
    pub fetches: AtomicUsize,
}

impl FakeSource {
    pub fn new(pages: &[(&str, &str)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(title, body)| ((*title).to_string(), (*body).to_string()))
                .collect(),
            failing: Mutex::new(HashSet::new()),
            delay: Duration::ZERO,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_title(&self, title: &str) {
        self.failing
            .lock()
            .expect("failing set lock")
            .insert(title.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().expect("failing set lock").clear();
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentSource for FakeSource {
    async fn fetch(&self, titles: &[String], _suggest_alternate: bool) -> Result<Vec<Document>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failing = self.failing.lock().expect("failing set lock").clone();
        titles
            .iter()
            .map(|title| {
                if failing.contains(title) {
                    return Err(RagError::SourceFetch {
                        title: title.clone(),
                        message: "injected failure".to_string(),
                    });
                }
                self.pages
                    .get(title)
                    .map(|body| Document {
                        title: title.clone(),
                        body: body.clone(),
                    })
                    .ok_or_else(|| RagError::SourceFetch {
                        title: title.clone(),
                        message: "page does not exist".to_string(),
                    })
            })
            .collect()
    }
}

/// Answers with the prompt it was given, optionally failing on demand
#[derive(Default)]
pub struct EchoGenerator {
    fail_next: AtomicBool,
    pub calls: AtomicUsize,
    pub temperatures: Mutex<Vec<f32>>,
}

impl EchoGenerator {
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Generator for EchoGenerator {
    fn model_id(&self) -> &str {
        "echo-generator"
    }

    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.temperatures
            .lock()
            .expect("temperature log lock")
            .push(temperature);

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(RagError::GenerationService(
                "injected generation failure".to_string(),
            ));
        }

        Ok(prompt.to_string())
    }
}

pub const CATS: &str = "Cats are small carnivorous mammals. \
    Cats have retractable claws and purr when content.";
pub const DOGS: &str = "Dogs are domesticated mammals descended from wolves. \
    Dogs bark and are kept as loyal companions.";

pub fn pet_pages() -> Vec<(&'static str, &'static str)> {
    vec![("Cats", CATS), ("Dogs", DOGS)]
}

/// Configuration rooted in `dir` indexing the given titles
pub fn test_config(dir: &Path, titles: &[&str]) -> Config {
    let mut config = Config {
        base_dir: dir.to_path_buf(),
        ..Config::default()
    };
    config.wikipedia.pages = titles.iter().map(|t| (*t).to_string()).collect();
    config
}
