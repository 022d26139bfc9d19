use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use wiki_rag::commands::{ask, build, chat, clear, load_config, show_status};
use wiki_rag::config::{Config, run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "wiki-rag")]
#[command(about = "Answer questions from a fixed set of Wikipedia articles")]
#[command(version)]
struct Cli {
    /// Configuration directory (defaults to $WIKI_RAG_HOME or the platform config dir)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question
    Ask {
        /// The question to answer
        question: String,
        /// Number of context chunks to retrieve
        #[arg(long, value_parser = clap::value_parser!(u16).range(1..=50))]
        top_k: Option<u16>,
    },
    /// Ask questions interactively
    Chat,
    /// Build the index, or load it if it already exists
    Build,
    /// Delete the persisted index
    Clear {
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Show the index location and contents
    Status,
    /// Configure the OpenAI models and Wikipedia articles
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => Config::default_dir()?,
    };

    match cli.command {
        Commands::Ask { question, top_k } => {
            ask(&config_dir, &question, top_k.map(usize::from)).await?;
        }
        Commands::Chat => {
            chat(&config_dir).await?;
        }
        Commands::Build => {
            build(&config_dir).await?;
        }
        Commands::Clear { yes } => {
            clear(&config_dir, yes).await?;
        }
        Commands::Status => {
            show_status(&config_dir).await?;
        }
        Commands::Config { show } => {
            if show {
                show_config(&load_config(&config_dir)?);
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
    }

    Ok(())
}
