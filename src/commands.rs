use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::Config;
use crate::index::{self, VectorIndex};
use crate::indexer::IndexBuilder;
use crate::openai::OpenAiClient;
use crate::query::Answer;
use crate::session::Session;
use crate::source::WikipediaClient;

/// Words that end an interactive chat
const EXIT_WORDS: [&str; 2] = ["exit", "quit"];

/// Load and validate the configuration in `config_dir`
#[inline]
pub fn load_config(config_dir: &Path) -> Result<Config> {
    Config::load(config_dir).with_context(|| {
        format!(
            "Failed to load configuration from {}",
            config_dir.display()
        )
    })
}

/// Wire the OpenAI and Wikipedia adapters into a session.
///
/// Fails before any index or query work when the API key is missing.
#[inline]
pub fn open_session(config: &Config) -> Result<Session> {
    let api_key = Config::api_key()?;
    let openai = Arc::new(OpenAiClient::new(&config.openai, api_key)?);
    let wikipedia = Arc::new(WikipediaClient::new(&config.wikipedia)?);

    let builder = IndexBuilder::new(config, wikipedia, Arc::clone(&openai) as _).with_progress(true);
    Ok(Session::new(builder, openai, config.index.top_k))
}

/// Answer a single question and print it with its context
#[inline]
pub async fn ask(config_dir: &Path, question: &str, top_k: Option<usize>) -> Result<()> {
    let config = load_config(config_dir)?;
    let session = open_session(&config)?;

    info!("Answering question: {}", question);
    let answer = match top_k {
        Some(top_k) => session.ask_with_top_k(question, top_k).await?,
        None => session.ask(question).await?,
    };

    print_answer(&answer);
    Ok(())
}

/// Interactive question loop. A failed question is reported and the loop continues.
#[inline]
pub async fn chat(config_dir: &Path) -> Result<()> {
    let config = load_config(config_dir)?;
    let session = open_session(&config)?;

    eprintln!("{}", style("📚 Wikipedia Q&A").bold().cyan());
    eprintln!(
        "Answers come from {} articles. Type {} to leave, Ctrl-C cancels a running question.",
        config.wikipedia.pages.len(),
        style("exit").cyan()
    );
    eprintln!();

    loop {
        let Some(question) = prompt_question().await? else {
            break;
        };

        let question = question.trim();
        if question.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&question.to_lowercase().as_str()) {
            break;
        }

        tokio::select! {
            result = session.ask(question) => match result {
                Ok(answer) => print_answer(&answer),
                Err(e) => {
                    error!("Question failed: {}", e);
                    eprintln!("{}", style(format!("❌ {e}")).red());
                }
            },
            _ = tokio::signal::ctrl_c() => {
                eprintln!("{}", style("Cancelled.").yellow());
            }
        }
        eprintln!();
    }

    Ok(())
}

/// Read one question from the terminal, or `None` at end of input
async fn prompt_question() -> Result<Option<String>> {
    let input = tokio::task::spawn_blocking(|| {
        Input::<String>::new()
            .with_prompt("Enter a question")
            .allow_empty(true)
            .interact_text()
    })
    .await
    .context("Prompt task panicked")?;

    match input {
        Ok(question) => Ok(Some(question)),
        Err(dialoguer::Error::IO(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e).context("Failed to read question"),
    }
}

/// Build the index if needed and print a summary of it
#[inline]
pub async fn build(config_dir: &Path) -> Result<()> {
    let config = load_config(config_dir)?;
    let session = open_session(&config)?;

    let existed = index::exists(session.index_location());
    let index = session.index().await?;

    if existed {
        eprintln!("{}", style("✓ Loaded existing index").green());
    } else {
        eprintln!("{}", style("✓ Built new index").green());
    }
    print_index_summary(&index);

    Ok(())
}

/// Delete the persisted index, asking first unless `yes` is set
#[inline]
pub async fn clear(config_dir: &Path, yes: bool) -> Result<()> {
    let config = load_config(config_dir)?;
    let location = config.index_path();

    if !yes
        && !Confirm::new()
            .with_prompt(format!("Delete the index at {}?", location.display()))
            .default(false)
            .interact()?
    {
        eprintln!("Index not cleared.");
        return Ok(());
    }

    if index::clear(&location).await? {
        eprintln!(
            "{}",
            style("✓ Index cleared. It will be rebuilt on the next question.").green()
        );
    } else {
        eprintln!("No index found at {}", location.display());
    }

    Ok(())
}

/// Show where the index lives and what it contains
#[inline]
pub async fn show_status(config_dir: &Path) -> Result<()> {
    let config = load_config(config_dir)?;
    let location = config.index_path();

    eprintln!("{}", style("📊 Wiki RAG Status").bold().cyan());
    eprintln!();
    eprintln!("  Config: {}", style(config.config_file_path().display()).cyan());
    eprintln!("  Index: {}", style(location.display()).cyan());
    let key_state = if Config::api_key().is_ok() {
        style("set").green()
    } else {
        style("missing").red()
    };
    eprintln!("  API key: {key_state}");
    eprintln!();

    if !index::exists(&location) {
        eprintln!(
            "{}",
            style("No index yet. It is built on the first question or with 'wiki-rag build'.")
                .yellow()
        );
        return Ok(());
    }

    match VectorIndex::load(&location, None).await {
        Ok(index) => {
            print_index_summary(&index);
            if index.stamp().embedding_model != config.openai.embedding_model {
                eprintln!();
                eprintln!(
                    "{}",
                    style(format!(
                        "⚠ Configured embedding model '{}' differs from the index. Clear the index to rebuild it.",
                        config.openai.embedding_model
                    ))
                    .yellow()
                );
            }
        }
        Err(e) => eprintln!("{}", style(format!("❌ {e}")).red()),
    }

    Ok(())
}

fn print_index_summary(index: &VectorIndex) {
    eprintln!("{}", style("Index").bold().yellow());
    eprintln!("  Location: {}", index.location().display());
    eprintln!(
        "  Embedding model: {} ({} dimensions)",
        style(&index.stamp().embedding_model).cyan(),
        index.stamp().dimension
    );
    eprintln!("  Created: {}", index.created_at());
    eprintln!(
        "  Documents: {}, chunks: {}",
        index.documents().len(),
        index.chunk_count()
    );
    for document in index.documents() {
        eprintln!(
            "    {} {} ({} chunks)",
            style("•").dim(),
            document.title,
            document.chunk_count
        );
    }
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.text.trim());
    println!();
    println!("{}", style("Context").bold().yellow());
    for (rank, scored) in answer.context.iter().enumerate() {
        println!(
            "{} {} {}",
            style(format!("[{}]", rank + 1)).cyan(),
            style(&scored.chunk.heading_path).bold(),
            style(format!("(score {:.3})", scored.score)).dim()
        );
        println!("{}", scored.chunk.content.trim());
        println!();
    }
}
