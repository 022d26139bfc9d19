
use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};

use super::{Config, ConfigError, IndexConfig, OpenAiConfig, WikipediaConfig};
use crate::openai::OpenAiClient;

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Wiki RAG Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir);

    eprintln!("{}", style("OpenAI Configuration").bold().yellow());
    eprintln!("Models used for embedding chunks and answering questions.");
    eprintln!();

    configure_openai(&mut config.openai)?;

    eprintln!();
    eprintln!("{}", style("Wikipedia Configuration").bold().yellow());
    eprintln!("Articles indexed on first use. Changing them requires clearing the index.");
    eprintln!();

    configure_wikipedia(&mut config.wikipedia)?;
    configure_index(&mut config.index)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    match test_openai_connection(&config.openai) {
        Ok(()) => eprintln!("{}", style("✓ OpenAI connection successful!").green()),
        Err(e) => {
            eprintln!(
                "{}",
                style(format!("⚠ Warning: Could not reach OpenAI: {e:#}")).yellow()
            );
            eprintln!("You can continue, but questions will fail until this is fixed.");
        }
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("OpenAI Settings:").bold().yellow());
    eprintln!("  Base URL: {}", style(&config.openai.base_url).cyan());
    eprintln!(
        "  Embedding Model: {}",
        style(&config.openai.embedding_model).cyan()
    );
    eprintln!("  Chat Model: {}", style(&config.openai.chat_model).cyan());
    eprintln!("  Batch Size: {}", style(config.openai.batch_size).cyan());
    let key_state = if Config::api_key().is_ok() {
        style("set").green()
    } else {
        style("missing").red()
    };
    eprintln!("  {}: {}", super::API_KEY_ENV, key_state);

    eprintln!();
    eprintln!("{}", style("Wikipedia Settings:").bold().yellow());
    eprintln!("  API URL: {}", style(&config.wikipedia.api_url).cyan());
    eprintln!(
        "  Auto Suggest: {}",
        style(config.wikipedia.auto_suggest).cyan()
    );
    eprintln!("  Pages:");
    for page in &config.wikipedia.pages {
        eprintln!("    - {}", style(page).cyan());
    }

    eprintln!();
    eprintln!("{}", style("Index Settings:").bold().yellow());
    eprintln!(
        "  Location: {}",
        style(config.index_path().display()).cyan()
    );
    eprintln!("  Top K: {}", style(config.index.top_k).cyan());

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
}

fn load_existing_config(config_dir: &Path) -> Config {
    Config::load(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No usable configuration found. Using defaults.").yellow()
            );
            Config {
                base_dir: config_dir.to_path_buf(),
                ..Config::default()
            }
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            config
        },
    )
}

fn configure_openai(openai: &mut OpenAiConfig) -> Result<()> {
    let base_url: String = Input::new()
        .with_prompt("API base URL")
        .default(openai.base_url.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OpenAiConfig {
                base_url: input.clone(),
                ..OpenAiConfig::default()
            };
            temp_config.validate()
        })
        .interact_text()?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .default(openai.embedding_model.clone())
        .validate_with(non_blank("Model name cannot be empty"))
        .interact_text()?;

    let chat_model: String = Input::new()
        .with_prompt("Chat model")
        .default(openai.chat_model.clone())
        .validate_with(non_blank("Model name cannot be empty"))
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding requests")
        .default(openai.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 2048 {
                Err("Batch size must be 2048 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    openai.set_base_url(base_url)?;
    openai.set_embedding_model(embedding_model)?;
    openai.set_chat_model(chat_model)?;
    openai.set_batch_size(batch_size)?;

    Ok(())
}

fn configure_wikipedia(wikipedia: &mut WikipediaConfig) -> Result<()> {
    let pages: String = Input::new()
        .with_prompt("Pages (comma separated)")
        .default(wikipedia.pages.join(", "))
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let mut temp_config = WikipediaConfig::default();
            temp_config.set_pages(parse_page_list(input))
        })
        .interact_text()?;

    let auto_suggest = Confirm::new()
        .with_prompt("Resolve titles through Wikipedia search?")
        .default(wikipedia.auto_suggest)
        .interact()?;

    wikipedia.set_pages(parse_page_list(&pages))?;
    wikipedia.auto_suggest = auto_suggest;

    Ok(())
}

fn configure_index(index: &mut IndexConfig) -> Result<()> {
    let top_k: usize = Input::new()
        .with_prompt("Chunks retrieved per question")
        .default(index.top_k)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=50).contains(input) {
                Ok(())
            } else {
                Err("Must be between 1 and 50")
            }
        })
        .interact_text()?;

    index.set_top_k(top_k)?;
    Ok(())
}

fn non_blank(message: &'static str) -> impl Fn(&String) -> Result<(), &'static str> {
    move |input: &String| {
        if input.trim().is_empty() {
            Err(message)
        } else {
            Ok(())
        }
    }
}

/// Split a comma separated list of page titles, dropping empty entries
fn parse_page_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn test_openai_connection(openai: &OpenAiConfig) -> Result<()> {
    let api_key = Config::api_key()?;
    let client = OpenAiClient::new(openai, api_key)?
        .with_timeout(std::time::Duration::from_secs(5))
        .with_retry_attempts(1);
    client.health_check()?;
    Ok(())
}
