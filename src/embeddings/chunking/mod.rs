
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::source::Document;

/// Sections that carry no article prose in plain-text extracts
const SKIPPED_SECTIONS: [&str; 6] = [
    "see also",
    "references",
    "external links",
    "further reading",
    "notes",
    "bibliography",
];

/// A chunk of an article ready for embedding
#[derive(Debug, Clone, PartialEq)]
pub struct ContentChunk {
    /// Title of the document this chunk came from
    pub document_title: String,
    /// The heading path for this chunk, rooted at the document title
    pub heading_path: String,
    /// The content text
    pub content: String,
    /// The index of this chunk within the document
    pub chunk_index: usize,
    /// Estimated token count
    pub token_count: usize,
}

/// A headed section of an article
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSection {
    pub heading_path: String,
    pub content: String,
}

/// Configuration for content chunking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in tokens
    pub target_chunk_size: usize,
    /// Maximum chunk size in tokens before forced splitting
    pub max_chunk_size: usize,
    /// Minimum chunk size in tokens (smaller chunks will be merged)
    pub min_chunk_size: usize,
    /// Overlap size in tokens between adjacent chunks
    pub overlap_size: usize,
    /// Whether to break at sentence boundaries when possible
    pub sentence_boundary_splitting: bool,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            target_chunk_size: 650,
            max_chunk_size: 1000,
            min_chunk_size: 100,
            overlap_size: 50,
            sentence_boundary_splitting: true,
        }
    }
}

/// Split an article into its headed sections.
///
/// Plain-text extracts mark headings as `== Heading ==`, with the number of
/// `=` giving the level. Text before the first heading belongs to a section
/// named after the document itself.
#[inline]
pub fn split_sections(document: &Document) -> Vec<ContentSection> {
    let mut sections = Vec::new();
    let mut headings: Vec<(usize, String)> = Vec::new();
    let mut skip_level: Option<usize> = None;
    let mut current = String::new();

    for line in document.body.lines() {
        let Some((level, heading)) = parse_heading(line) else {
            if skip_level.is_none() {
                current.push_str(line);
                current.push('\n');
            }
            continue;
        };

        if skip_level.is_none() {
            push_section(&mut sections, document, &headings, &current);
        }
        current.clear();

        if skip_level.is_some_and(|skip| level > skip) {
            continue;
        }
        skip_level = SKIPPED_SECTIONS
            .contains(&heading.to_lowercase().as_str())
            .then_some(level);

        while headings.last().is_some_and(|(l, _)| *l >= level) {
            headings.pop();
        }
        headings.push((level, heading));
    }

    if skip_level.is_none() {
        push_section(&mut sections, document, &headings, &current);
    }

    sections
}

fn parse_heading(line: &str) -> Option<(usize, String)> {
    let trimmed = line.trim();
    if trimmed.len() < 5 || !trimmed.starts_with("==") || !trimmed.ends_with("==") {
        return None;
    }

    let level = trimmed.chars().take_while(|c| *c == '=').count();
    let heading = trimmed.trim_matches('=').trim();
    if heading.is_empty() {
        return None;
    }

    Some((level, heading.to_string()))
}

fn push_section(
    sections: &mut Vec<ContentSection>,
    document: &Document,
    headings: &[(usize, String)],
    content: &str,
) {
    let content = content.trim();
    if content.is_empty() {
        return;
    }

    let heading_path = std::iter::once(document.title.as_str())
        .chain(headings.iter().map(|(_, name)| name.as_str()))
        .collect::<Vec<_>>()
        .join(" > ");

    sections.push(ContentSection {
        heading_path,
        content: content.to_string(),
    });
}

/// Chunk a document into embedding-ready pieces
#[inline]
pub fn chunk_document(document: &Document, config: &ChunkingConfig) -> Vec<ContentChunk> {
    let mut chunks = Vec::new();
    let mut chunk_index = 0;

    for section in &split_sections(document) {
        chunks.extend(chunk_section(document, section, config, &mut chunk_index));
    }

    // If every section was skipped, chunk the raw text as fallback
    if chunks.is_empty() && !document.body.trim().is_empty() {
        let fallback_section = ContentSection {
            heading_path: document.title.clone(),
            content: document.body.trim().to_string(),
        };
        chunks = chunk_section(document, &fallback_section, config, &mut chunk_index);
    }

    let processed_chunks = post_process_chunks(chunks, config);

    debug!(
        "Chunked document '{}' into {} chunks (avg {} tokens)",
        document.title,
        processed_chunks.len(),
        processed_chunks
            .iter()
            .map(|c| c.token_count)
            .sum::<usize>()
            / processed_chunks.len().max(1)
    );

    processed_chunks
}

/// Chunk a single content section
fn chunk_section(
    document: &Document,
    section: &ContentSection,
    config: &ChunkingConfig,
    chunk_index: &mut usize,
) -> Vec<ContentChunk> {
    let content = &section.content;
    if content.trim().is_empty() {
        return Vec::new();
    }

    let token_count = estimate_token_count(content);

    let splits = if token_count <= config.target_chunk_size {
        vec![content.clone()]
    } else {
        split_by_semantics(content, config)
    };

    let mut chunks = Vec::with_capacity(splits.len());
    for split in splits {
        if split.trim().is_empty() {
            continue;
        }

        chunks.push(ContentChunk {
            document_title: document.title.clone(),
            heading_path: section.heading_path.clone(),
            token_count: estimate_token_count(&split),
            content: split,
            chunk_index: *chunk_index,
        });
        *chunk_index += 1;
    }

    chunks
}

/// Split content using paragraph boundaries, falling back to sentences or words
fn split_by_semantics(content: &str, config: &ChunkingConfig) -> Vec<String> {
    let mut splitter = Accumulator::new(config.target_chunk_size);

    for paragraph in content.split("\n\n") {
        if paragraph.trim().is_empty() {
            continue;
        }

        if estimate_token_count(paragraph) > config.max_chunk_size {
            let pieces = if config.sentence_boundary_splitting {
                split_by_sentences(paragraph, config)
            } else {
                split_by_words(paragraph, config)
            };
            for piece in pieces {
                splitter.push(&piece, "\n\n");
            }
        } else {
            splitter.push(paragraph.trim(), "\n\n");
        }
    }

    splitter.finish()
}

/// Split text by sentences
fn split_by_sentences(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let mut splitter = Accumulator::new(config.target_chunk_size);

    for sentence in text.split_inclusive(['.', '!', '?']) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        // A single runaway sentence still has to fit
        if estimate_token_count(sentence) > config.max_chunk_size {
            for piece in split_by_words(sentence, config) {
                splitter.push(&piece, " ");
            }
        } else {
            splitter.push(sentence, " ");
        }
    }

    splitter.finish()
}

/// Split text by words as a last resort
fn split_by_words(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let mut splitter = Accumulator::new(config.target_chunk_size);

    for word in text.split_whitespace() {
        splitter.push(word, " ");
    }

    splitter.finish()
}

/// Greedy packer that starts a new split once the target size would be exceeded
struct Accumulator {
    target: usize,
    splits: Vec<String>,
    current: String,
    current_tokens: usize,
}

impl Accumulator {
    fn new(target: usize) -> Self {
        Self {
            target,
            splits: Vec::new(),
            current: String::new(),
            current_tokens: 0,
        }
    }

    fn push(&mut self, piece: &str, separator: &str) {
        let tokens = estimate_token_count(piece);

        if self.current_tokens + tokens > self.target && !self.current.trim().is_empty() {
            self.flush();
        }

        if !self.current.is_empty() {
            self.current.push_str(separator);
        }
        self.current.push_str(piece);
        self.current_tokens += tokens;
    }

    fn flush(&mut self) {
        let split = self.current.trim();
        if !split.is_empty() {
            self.splits.push(split.to_string());
        }
        self.current.clear();
        self.current_tokens = 0;
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.splits
    }
}

/// Post-process chunks to merge small ones and add overlap
fn post_process_chunks(chunks: Vec<ContentChunk>, config: &ChunkingConfig) -> Vec<ContentChunk> {
    if chunks.is_empty() {
        return chunks;
    }

    let mut processed = Vec::new();
    let mut pending_merge: Option<ContentChunk> = None;

    for chunk in chunks {
        if let Some(mut pending) = pending_merge.take() {
            if chunk.token_count < config.min_chunk_size
                && pending.token_count + chunk.token_count <= config.max_chunk_size
                && pending.heading_path == chunk.heading_path
            {
                pending.content.push_str("\n\n");
                pending.content.push_str(&chunk.content);
                pending.token_count += chunk.token_count;
                pending_merge = Some(pending);
                continue;
            }
            processed.push(pending);
        }

        if chunk.token_count < config.min_chunk_size {
            pending_merge = Some(chunk);
        } else {
            processed.push(chunk);
        }
    }

    if let Some(pending) = pending_merge {
        processed.push(pending);
    }

    if config.overlap_size > 0 {
        add_overlap(&mut processed, config);
    }

    for (i, chunk) in processed.iter_mut().enumerate() {
        chunk.chunk_index = i;
    }

    processed
}

/// Prepend the tail of the previous chunk when both come from the same section
fn add_overlap(chunks: &mut [ContentChunk], config: &ChunkingConfig) {
    for i in 1..chunks.len() {
        let (left, right) = chunks.split_at_mut(i);
        let prev_chunk = &left[i - 1];
        let curr_chunk = &mut right[0];

        if prev_chunk.heading_path == curr_chunk.heading_path {
            let overlap_text = extract_overlap_text(&prev_chunk.content, config.overlap_size);
            if !overlap_text.is_empty() {
                curr_chunk.content = format!("{}\n\n{}", overlap_text, curr_chunk.content);
                curr_chunk.token_count += estimate_token_count(&overlap_text);
            }
        }
    }
}

/// Extract overlap text from the end of a chunk
fn extract_overlap_text(content: &str, overlap_tokens: usize) -> String {
    let words: Vec<&str> = content.split_whitespace().collect();
    let word_count = (overlap_tokens as f64 * 0.75) as usize; // Rough word-to-token ratio

    if words.len() <= word_count {
        return String::new();
    }

    words[words.len() - word_count..].join(" ")
}

/// Estimate token count using a simple heuristic
/// This is a rough approximation - actual tokenization would be more accurate
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    // Rough heuristic: 1 token ≈ 0.75 words for English text
    // Add extra tokens for punctuation and special characters
    let word_count = text.split_whitespace().count();
    let punct_count = text.chars().filter(|c| c.is_ascii_punctuation()).count();

    (punct_count as f64).mul_add(0.1, word_count as f64 / 0.75) as usize
}

/// Text sent to the embedder for a chunk: the content prefixed with its page and section
#[inline]
pub fn embedding_input(chunk: &ContentChunk) -> String {
    if chunk.heading_path != chunk.document_title {
        format!(
            "Page: {}\nSection: {}\n\n{}",
            chunk.document_title, chunk.heading_path, chunk.content
        )
    } else {
        format!("Page: {}\n\n{}", chunk.document_title, chunk.content)
    }
}
