//! storymind - character extraction and visualization pipeline CLI
//!
//! Usage:
//!   storymind ingest <path>            Ingest a document
//!   storymind list                     List ingested sources
//!   storymind show <source-id>         Show a source's details
//!   storymind characters <source-id>   List a source's characters
//!   storymind generate-image <id>      (Re)generate a character's portrait
//!   storymind delete <source-id>       Delete a source and its characters

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use directories::ProjectDirs;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use storymind_core::config::load_config;
use storymind_core::{AnthropicClient, CandleEmbedder, HttpImageProvider, Orchestrator, DB};

#[derive(Parser)]
#[command(name = "storymind")]
#[command(about = "Character extraction and visualization pipeline")]
#[command(version)]
struct Cli {
    /// Emit machine-readable JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a document (PDF, EPUB, or plain text)
    Ingest {
        /// Path to the document
        path: PathBuf,
    },
    /// List ingested sources
    List,
    /// Show a source's details
    Show {
        /// Source ID
        source_id: i64,
    },
    /// List a source's characters
    Characters {
        /// Source ID
        source_id: i64,
    },
    /// (Re)generate a character's portrait
    GenerateImage {
        /// Character ID
        character_id: i64,
    },
    /// Delete a source and cascade-delete its characters and images
    Delete {
        /// Source ID
        source_id: i64,
    },
}

fn data_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "storymind").context("could not determine data directory")?;
    Ok(dirs.data_dir().to_path_buf())
}

fn load_embedder_with_spinner() -> Result<CandleEmbedder> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    spinner.set_message("loading embedding model...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));

    let device = storymind_core::make_device();
    let embedder = CandleEmbedder::new(&device).context("failed to load embedding model")?;

    spinner.finish_with_message("embedding model loaded");
    Ok(embedder)
}

fn build_orchestrator() -> Result<Orchestrator> {
    let base = data_dir()?;
    let config_path = storymind_core::config::default_config_path()?;
    let config = load_config(&config_path)?;

    let db_path = base.join("storymind.db");
    let index_dir = base.join("indexes");
    let image_dir = base.join("images");

    let db = DB::new(&db_path)?;
    let llm = AnthropicClient::from_env().context("failed to initialize LLM client")?;
    let image_provider = HttpImageProvider::from_env()
        .map_err(|e| anyhow::anyhow!("failed to initialize image provider: {e}"))?;
    let embedder = load_embedder_with_spinner()?;

    Ok(Orchestrator::new(
        db,
        index_dir,
        image_dir,
        Box::new(llm),
        Box::new(image_provider),
        Box::new(embedder),
        config,
    )?)
}

fn cmd_ingest(path: &PathBuf) -> Result<()> {
    tracing::debug!("ingesting {}", path.display());
    let mut orchestrator = build_orchestrator()?;
    let report = orchestrator.ingest(path)?;
    println!(
        "{} '{}' ({} windows, {} characters)",
        "ingested".green().bold(),
        report.title,
        report.window_count,
        report.character_count
    );
    Ok(())
}

#[derive(Serialize)]
struct SourceJson {
    id: i64,
    title: String,
    author: Option<String>,
    format: String,
    state: String,
    failure_reason: Option<String>,
    window_count: i64,
    character_count: i64,
}

impl From<storymind_core::Source> for SourceJson {
    fn from(source: storymind_core::Source) -> Self {
        Self {
            id: source.id,
            title: source.title,
            author: source.author,
            format: source.format,
            state: format!("{:?}", source.state),
            failure_reason: source.failure_reason,
            window_count: source.window_count,
            character_count: source.character_count,
        }
    }
}

#[derive(Serialize)]
struct CharacterJson {
    id: i64,
    name: String,
    mention_count: i64,
    seed: i64,
}

impl From<storymind_core::CharacterRow> for CharacterJson {
    fn from(character: storymind_core::CharacterRow) -> Self {
        Self {
            id: character.id,
            name: character.name,
            mention_count: character.mention_count,
            seed: character.seed,
        }
    }
}

fn cmd_list(json: bool) -> Result<()> {
    let orchestrator = build_orchestrator()?;
    let sources = orchestrator.db.list_sources()?;

    if json {
        let output: Vec<SourceJson> = sources.into_iter().map(SourceJson::from).collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if sources.is_empty() {
        println!("no sources ingested yet");
        return Ok(());
    }
    for source in sources {
        println!(
            "{:>4}  {:<40}  {:?}  {} characters",
            source.id, source.title, source.state, source.character_count
        );
    }
    Ok(())
}

fn cmd_show(source_id: i64, json: bool) -> Result<()> {
    let orchestrator = build_orchestrator()?;
    let source = orchestrator
        .db
        .get_source(source_id)?
        .context("no such source")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&SourceJson::from(source))?);
        return Ok(());
    }

    println!("title:      {}", source.title);
    println!("author:     {}", source.author.as_deref().unwrap_or("unknown"));
    println!("format:     {}", source.format);
    println!("state:      {:?}", source.state);
    println!("windows:    {}", source.window_count);
    println!("characters: {}", source.character_count);
    if let Some(reason) = source.failure_reason {
        println!("{} {}", "failure:".red(), reason);
    }
    Ok(())
}

fn cmd_characters(source_id: i64, json: bool) -> Result<()> {
    let orchestrator = build_orchestrator()?;
    let characters = orchestrator.db.list_characters(source_id)?;

    if json {
        let output: Vec<CharacterJson> = characters.into_iter().map(CharacterJson::from).collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if characters.is_empty() {
        println!("no characters for source {source_id}");
        return Ok(());
    }
    for character in characters {
        println!(
            "{:>4}  {:<30}  mentions={:<4}  seed={}",
            character.id, character.name, character.mention_count, character.seed
        );
    }
    Ok(())
}

fn cmd_generate_image(character_id: i64) -> Result<()> {
    let mut orchestrator = build_orchestrator()?;
    orchestrator.regenerate_image(character_id)?;
    let image = orchestrator
        .db
        .current_image(character_id)?
        .context("image generation did not produce a record")?;
    println!(
        "{} outcome={} path={}",
        "generated".green().bold(),
        image.outcome,
        image.path
    );
    Ok(())
}

fn cmd_delete(source_id: i64) -> Result<()> {
    let mut orchestrator = build_orchestrator()?;
    orchestrator.delete_source(source_id)?;
    println!("{} source {source_id}", "deleted".red().bold());
    Ok(())
}

fn main() -> Result<()> {
    storymind_core::logging::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest { path } => cmd_ingest(&path),
        Commands::List => cmd_list(cli.json),
        Commands::Show { source_id } => cmd_show(source_id, cli.json),
        Commands::Characters { source_id } => cmd_characters(source_id, cli.json),
        Commands::GenerateImage { character_id } => cmd_generate_image(character_id),
        Commands::Delete { source_id } => cmd_delete(source_id),
    }
}
