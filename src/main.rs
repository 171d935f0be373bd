use anyhow::{Context, Result};
use clap::Parser;
use comicloader::config::Config;
use comicloader::database::Database;
use comicloader::storage::CloudinaryStore;
use comicloader::{Orchestrator, StartChapter};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "comicloader")]
#[command(about = "Mirror a webcomic's chapters to Cloudinary")]
#[command(version)]
struct Cli {
    /// Comic slug as it appears in the site URL (komik/<slug>/)
    slug: String,

    /// Base URL of the comic website
    #[arg(long)]
    base_url: Option<String>,

    /// First chapter to download; prompts when omitted
    #[arg(short, long)]
    start: Option<f64>,

    /// Configuration file path
    #[arg(short, long, default_value = "comicloader.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    let mut config = Config::load(&cli.config).context("failed to load configuration")?;
    if let Some(base_url) = cli.base_url {
        config.site.base_url = base_url;
        config.validate()?;
    }

    let db = Database::new(&config.database.url, config.database.max_connections).await?;
    db.init().await?;

    let store = CloudinaryStore::new(&config.cloudinary)?;
    let orchestrator = Orchestrator::new(&config, Arc::new(store), Arc::new(db))?;

    let start = match cli.start {
        Some(start) => StartChapter::Fixed(Some(start)),
        None => StartChapter::Prompt,
    };

    info!("🚀 Scraping {} from {}", cli.slug, config.site.base_url);
    match orchestrator.run(&cli.slug, start).await {
        Ok(summary) => {
            println!("✅ {}", summary);
            Ok(())
        }
        Err(e) => {
            error!("❌ Failed to process comic {}: {}", cli.slug, e);
            Err(e.into())
        }
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(format!("comicloader={}", level))
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .init();

    Ok(())
}
