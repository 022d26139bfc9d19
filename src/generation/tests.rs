use super::*;
use crate::embeddings::ContentChunk;

fn scored(title: &str, section: &str, content: &str, score: f32) -> ScoredChunk {
    ScoredChunk {
        chunk: ContentChunk {
            document_title: title.to_string(),
            heading_path: section.to_string(),
            content: content.to_string(),
            chunk_index: 0,
            token_count: 4,
        },
        score,
    }
}

#[test]
fn prompt_follows_template() {
    let context = vec![
        scored("Cats", "Cats > Biology", "Cats are mammals.", 0.9),
        scored("Dogs", "Dogs", "Dogs are mammals too.", 0.8),
    ];

    let prompt = build_prompt("  What are cats?  ", &context);

    assert_eq!(
        prompt,
        "Context information is below.\n\
         ---------------------\n\
         source: Cats > Biology\n\
         Cats are mammals.\n\
         \n\
         source: Dogs\n\
         Dogs are mammals too.\n\
         ---------------------\n\
         Given the context information and not prior knowledge, answer the query.\n\
         Query: What are cats?\n\
         Answer: "
    );
}

#[test]
fn prompt_keeps_context_order() {
    let context = vec![
        scored("B", "B", "second by title", 0.5),
        scored("A", "A", "first by title", 0.4),
    ];

    let prompt = build_prompt("q", &context);
    let b = prompt.find("second by title").expect("B present");
    let a = prompt.find("first by title").expect("A present");

    assert!(b < a);
}

#[test]
fn answer_temperature_is_deterministic() {
    assert!(ANSWER_TEMPERATURE.abs() < f32::EPSILON);
}
