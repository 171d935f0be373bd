use crate::config::Config;
use crate::error::{Result, ScraperError};
use crate::http::Fetcher;
use crate::models::{Chapter, Comic, ComicMetadata, DownloadTask, RunSummary, UpsertOutcome};
use crate::pipeline::ChapterPipeline;
use crate::publisher::AssetPublisher;
use crate::rate_limit::RateLimiter;
use crate::scanner;
use crate::scheduler::Scheduler;
use crate::traits::{AssetStore, MetadataStore};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use url::Url;

/// Where the minimum starting chapter comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartChapter {
    /// Ask on stdin.
    Prompt,
    /// `None` downloads every chapter.
    Fixed(Option<f64>),
}

/// Empty input means every chapter. Input that is not a number is treated
/// the same way, with a warning.
pub fn parse_start_input(input: &str) -> Option<f64> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    match input.parse::<f64>() {
        Ok(number) if number.is_finite() => Some(number),
        _ => {
            warn!("[ORCHESTRATOR] '{}' is not a chapter number, downloading all chapters", input);
            None
        }
    }
}

/// Chapters numbered `start` or above, keeping their order.
pub fn filter_chapters(chapters: &[Chapter], start: Option<f64>) -> Vec<Chapter> {
    chapters
        .iter()
        .filter(|c| start.map_or(true, |s| c.number >= s))
        .cloned()
        .collect()
}

async fn prompt_start_chapter() -> Result<Option<f64>> {
    print!("Enter starting chapter number (press Enter to scrape all): ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(parse_start_input(&line))
}

pub fn print_comic_info(meta: &ComicMetadata) {
    let synopsis: String = meta.synopsis.chars().take(200).collect();
    println!("\n=== Comic Information ===");
    println!("Title    : {}", meta.title);
    println!("Author   : {}", meta.author);
    println!("Type     : {}", meta.kind);
    println!("Status   : {}", meta.status);
    println!("Rating   : {}", meta.rating);
    println!("Genres   : {}", meta.genres.join(", "));
    println!("\nSynopsis : {}...", synopsis);
    println!("=====================\n");
}

/// One scrape of one comic, from landing page to uploaded chapters.
pub struct Orchestrator {
    base_url: Url,
    fetcher: Fetcher,
    limiter: RateLimiter,
    publisher: AssetPublisher,
    metadata: Arc<dyn MetadataStore>,
    max_concurrent_chapters: usize,
    show_progress: bool,
}

impl Orchestrator {
    pub fn new(config: &Config, store: Arc<dyn AssetStore>, metadata: Arc<dyn MetadataStore>) -> Result<Self> {
        let mut base_url = Url::parse(&config.site.base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            base_url,
            fetcher: Fetcher::new(&config.site, &config.fetch, &config.rate_limit)?,
            limiter: RateLimiter::from_config(&config.rate_limit),
            publisher: AssetPublisher::new(store),
            metadata,
            max_concurrent_chapters: config.scheduler.max_concurrent_chapters,
            show_progress: true,
        })
    }

    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn comic_url(&self, slug: &str) -> Result<Url> {
        Ok(self.base_url.join(&format!("komik/{}/", slug))?)
    }

    /// Fails only when the comic page cannot be fetched or lists no chapters.
    pub async fn run(&self, slug: &str, start: StartChapter) -> Result<RunSummary> {
        let comic_url = self.comic_url(slug)?;
        info!("[ORCHESTRATOR] Fetching comic page {}", comic_url);
        let html = self.fetcher.fetch_text(comic_url.as_str()).await?;
        let page = scanner::parse_comic_page(&html, &comic_url)?;

        let cover_ref = self
            .publisher
            .publish_cover(slug, &page.cover_url, &self.fetcher, &self.limiter)
            .await;

        print_comic_info(&page.metadata);

        let Some(latest) = page.chapters.last() else {
            error!("[ORCHESTRATOR] No chapters found for {}", slug);
            return Err(ScraperError::extraction(format!("no chapters found for {}", slug)));
        };
        info!("[ORCHESTRATOR] Latest chapter: {}", latest.label());

        let start = match start {
            StartChapter::Prompt => prompt_start_chapter().await?,
            StartChapter::Fixed(start) => start,
        };

        let selected = filter_chapters(&page.chapters, start);
        let mut pending = Vec::with_capacity(selected.len());
        let mut already_present = 0;
        for chapter in selected {
            let folder = DownloadTask::new(slug, chapter.clone()).folder();
            if self.publisher.folder_exists(&folder).await {
                info!("[ORCHESTRATOR] Chapter {} already exists", chapter.label());
                already_present += 1;
            } else {
                pending.push(chapter);
            }
        }

        let comic = Comic::from_metadata(slug, page.metadata, cover_ref.unwrap_or_default());
        self.persist(&comic).await;

        if pending.is_empty() {
            info!("[ORCHESTRATOR] All selected chapters already exist. No new chapters to scrape.");
            return Ok(RunSummary {
                skipped: already_present,
                ..RunSummary::default()
            });
        }

        info!("[ORCHESTRATOR] Dispatching {} chapters", pending.len());
        let tasks: Vec<DownloadTask> = pending.into_iter().map(|c| DownloadTask::new(slug, c)).collect();
        let pipeline = ChapterPipeline::new(self.fetcher.clone(), self.limiter, self.publisher.clone());
        let pipeline = &pipeline;

        let mut scheduler = Scheduler::new(self.max_concurrent_chapters);
        if !self.show_progress {
            scheduler = scheduler.without_progress();
        }
        let outcomes = scheduler.run_all(tasks, move |task| pipeline.run(task)).await;

        let mut summary = RunSummary::from_outcomes(&outcomes);
        summary.skipped += already_present;
        info!("[ORCHESTRATOR] Finished {}: {}", slug, summary);
        Ok(summary)
    }

    /// Persistence failures are logged; the scrape carries on without them.
    async fn persist(&self, comic: &Comic) {
        match self.metadata.upsert_by_slug(comic).await {
            Ok(UpsertOutcome::Inserted) => info!("[ORCHESTRATOR] Saved comic metadata to database: {}", comic.slug),
            Ok(UpsertOutcome::Touched) => info!("[ORCHESTRATOR] Updated comic metadata in database: {}", comic.slug),
            Err(e) => error!("[ORCHESTRATOR] Error saving comic metadata to database: {}", e),
        }
    }
}
