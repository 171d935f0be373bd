use crate::error::Result;
use crate::http::Fetcher;
use crate::models::{ChapterOutcome, DownloadTask};
use crate::publisher::AssetPublisher;
use crate::rate_limit::RateLimiter;
use crate::scanner;
use tracing::{debug, error, info, warn};
use url::Url;

/// Downloads one chapter and mirrors its images to the asset store.
///
/// PENDING → FOLDER_CHECKED → SKIPPED, or
/// PENDING → FOLDER_CHECKED → FETCHING → EXTRACTING → DOWNLOADING → DONE.
/// Any error on the way ends in FAILED; nothing escapes [`ChapterPipeline::run`].
#[derive(Clone)]
pub struct ChapterPipeline {
    fetcher: Fetcher,
    limiter: RateLimiter,
    publisher: AssetPublisher,
}

impl ChapterPipeline {
    pub fn new(fetcher: Fetcher, limiter: RateLimiter, publisher: AssetPublisher) -> Self {
        Self {
            fetcher,
            limiter,
            publisher,
        }
    }

    pub async fn run(&self, task: DownloadTask) -> ChapterOutcome {
        let label = task.chapter.label();
        match self.process(&task).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("[PIPELINE] Chapter {} of {} failed: {}", label, task.comic_slug, e);
                ChapterOutcome::Failed { reason: e.to_string() }
            }
        }
    }

    async fn process(&self, task: &DownloadTask) -> Result<ChapterOutcome> {
        let label = task.chapter.label();
        let folder = task.folder();

        debug!("[PIPELINE] chapter {}: PENDING -> FOLDER_CHECKED", label);
        if self.publisher.folder_exists(&folder).await {
            info!("[PIPELINE] Chapter {} already exists. Skipping...", label);
            debug!("[PIPELINE] chapter {}: FOLDER_CHECKED -> SKIPPED", label);
            return Ok(ChapterOutcome::Skipped);
        }

        debug!("[PIPELINE] chapter {}: FOLDER_CHECKED -> FETCHING", label);
        let page_url = Url::parse(&task.chapter.source_url)?;
        let html = self.fetcher.fetch_text(page_url.as_str()).await?;

        debug!("[PIPELINE] chapter {}: FETCHING -> EXTRACTING", label);
        let images = scanner::extract_image_urls(&html, &page_url)?;
        if images.is_empty() {
            warn!("[PIPELINE] Chapter {} has no images", label);
        }

        debug!("[PIPELINE] chapter {}: EXTRACTING -> DOWNLOADING ({} images)", label, images.len());
        let mut uploaded = Vec::with_capacity(images.len());
        for (index, image_url) in images.iter().enumerate() {
            debug!("[PIPELINE] chapter {}: image {}/{}", label, index + 1, images.len());

            let bytes = match self.limiter.limited(|| self.fetcher.fetch_image(image_url)).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("[PIPELINE] Skipping image {} of chapter {}: {}", image_url, label, e);
                    continue;
                }
            };

            if let Some(secure_url) = self.publisher.publish(bytes, &folder.image(image_url, index + 1)).await {
                uploaded.push(secure_url);
            }
        }

        debug!("[PIPELINE] chapter {}: DOWNLOADING -> DONE", label);
        info!(
            "[PIPELINE] Chapter {} done: {}/{} images uploaded",
            label,
            uploaded.len(),
            images.len()
        );
        Ok(ChapterOutcome::Done {
            uploaded,
            attempted: images.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chapter;
    use crate::testing::{fetcher, no_delay, MemoryStore};
    use std::sync::Arc;

    fn pipeline(store: Arc<MemoryStore>) -> ChapterPipeline {
        ChapterPipeline::new(fetcher(), no_delay(), AssetPublisher::new(store))
    }

    #[tokio::test]
    async fn existing_folder_skips_without_network() {
        let mut server = mockito::Server::new_async().await;
        let page = server
            .mock("GET", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let store = Arc::new(MemoryStore::with_assets(&["alpha/chapter-2/001"]));
        let task = DownloadTask::new(
            "alpha",
            Chapter::new(2.0, format!("{}/chapter/alpha-chapter-2/", server.url())),
        );

        let outcome = pipeline(store.clone()).run(task).await;

        assert_eq!(outcome, ChapterOutcome::Skipped);
        assert!(store.uploads().is_empty());
        page.assert_async().await;
    }

    #[tokio::test]
    async fn images_are_published_in_order() {
        let mut server = mockito::Server::new_async().await;
        let html = format!(
            r#"<div id="chapter_body"><div class="main-reading-area">
                 <img src="{0}/img/001.jpg"><img src="{0}/img/002.jpg"><img src="{0}/img/003.jpg">
               </div></div>"#,
            server.url()
        );
        let _page = server
            .mock("GET", "/chapter/alpha-chapter-2-5/")
            .with_body(html)
            .create_async()
            .await;
        let _one = server.mock("GET", "/img/001.jpg").with_body("a").create_async().await;
        let _two = server.mock("GET", "/img/002.jpg").with_status(404).create_async().await;
        let _three = server.mock("GET", "/img/003.jpg").with_body("c").create_async().await;

        let store = Arc::new(MemoryStore::default());
        let task = DownloadTask::new(
            "alpha",
            Chapter::new(2.5, format!("{}/chapter/alpha-chapter-2-5/", server.url())),
        );

        let outcome = pipeline(store.clone()).run(task).await;

        assert_eq!(
            outcome,
            ChapterOutcome::Done {
                uploaded: vec![
                    "https://assets.test/alpha/chapter-2.5/001".to_string(),
                    "https://assets.test/alpha/chapter-2.5/003".to_string(),
                ],
                attempted: 3,
            }
        );
        assert_eq!(
            store.uploads(),
            vec!["alpha/chapter-2.5/001".to_string(), "alpha/chapter-2.5/003".to_string()]
        );
    }

    #[tokio::test]
    async fn nameless_image_gets_positional_id() {
        let mut server = mockito::Server::new_async().await;
        let html = format!(
            r#"<div id="chapter_body"><div class="main-reading-area">
                 <img src="{0}/img/001.jpg"><img src="{0}/img/raw/">
               </div></div>"#,
            server.url()
        );
        let _page = server.mock("GET", "/chapter/c7/").with_body(html).create_async().await;
        let _images = server
            .mock("GET", mockito::Matcher::Regex(r"^/img/".to_string()))
            .with_body("x")
            .create_async()
            .await;

        let store = Arc::new(MemoryStore::default());
        let task = DownloadTask::new("alpha", Chapter::new(7.0, format!("{}/chapter/c7/", server.url())));

        pipeline(store.clone()).run(task).await;

        assert_eq!(
            store.uploads(),
            vec!["alpha/chapter-7/001".to_string(), "alpha/chapter-7/image-002".to_string()]
        );
    }

    #[tokio::test]
    async fn failed_uploads_do_not_abort_chapter() {
        let mut server = mockito::Server::new_async().await;
        let html = format!(
            r#"<div id="chapter_body"><div class="main-reading-area">
                 <img src="{0}/img/001.jpg"><img src="{0}/img/002.jpg">
               </div></div>"#,
            server.url()
        );
        let _page = server.mock("GET", "/chapter/c1/").with_body(html).create_async().await;
        let images = server
            .mock("GET", mockito::Matcher::Regex(r"^/img/".to_string()))
            .with_body("x")
            .expect(2)
            .create_async()
            .await;

        let store = Arc::new(MemoryStore::default());
        store.fail_uploads();
        let task = DownloadTask::new("alpha", Chapter::new(1.0, format!("{}/chapter/c1/", server.url())));

        let outcome = pipeline(store).run(task).await;

        assert_eq!(outcome, ChapterOutcome::Done { uploaded: vec![], attempted: 2 });
        images.assert_async().await;
    }

    #[tokio::test]
    async fn page_fetch_failure_is_reported_as_failed() {
        let mut server = mockito::Server::new_async().await;
        let _page = server
            .mock("GET", "/chapter/gone/")
            .with_status(500)
            .create_async()
            .await;

        let task = DownloadTask::new("alpha", Chapter::new(4.0, format!("{}/chapter/gone/", server.url())));
        let outcome = pipeline(Arc::new(MemoryStore::default())).run(task).await;

        assert!(matches!(outcome, ChapterOutcome::Failed { .. }));
    }
}
