//! In-memory doubles shared by the unit tests.

use crate::config::Config;
use crate::error::{Result, ScraperError};
use crate::http::Fetcher;
use crate::models::{Comic, UpsertOutcome};
use crate::rate_limit::RateLimiter;
use crate::traits::{AssetStore, MetadataStore};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct MemoryStore {
    assets: Mutex<BTreeSet<String>>,
    uploads: Mutex<Vec<String>>,
    lookups: AtomicUsize,
    fail_uploads: AtomicBool,
}

impl MemoryStore {
    pub fn with_assets(paths: &[&str]) -> Self {
        let store = Self::default();
        store
            .assets
            .lock()
            .unwrap()
            .extend(paths.iter().map(|p| p.to_string()));
        store
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn fail_uploads(&self) {
        self.fail_uploads.store(true, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl AssetStore for MemoryStore {
    async fn exists(&self, prefix: &str) -> Result<bool> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.assets.lock().unwrap().iter().any(|p| p.starts_with(prefix)))
    }

    async fn upload(&self, _bytes: Vec<u8>, folder: &str, public_id: &str) -> Result<String> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(ScraperError::publish("store unavailable"));
        }
        let path = format!("{}/{}", folder, public_id);
        self.assets.lock().unwrap().insert(path.clone());
        self.uploads.lock().unwrap().push(path.clone());
        Ok(self.url_for(&path))
    }

    fn url_for(&self, path: &str) -> String {
        format!("https://assets.test/{}", path)
    }
}

#[derive(Default)]
pub struct MemoryMetadata {
    pub comics: Mutex<Vec<Comic>>,
    pub fail: AtomicBool,
}

#[async_trait::async_trait]
impl MetadataStore for MemoryMetadata {
    async fn upsert_by_slug(&self, comic: &Comic) -> Result<UpsertOutcome> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ScraperError::Persistence(sqlx::Error::PoolClosed));
        }
        let mut comics = self.comics.lock().unwrap();
        if comics.iter().any(|c| c.slug == comic.slug) {
            return Ok(UpsertOutcome::Touched);
        }
        comics.push(comic.clone());
        Ok(UpsertOutcome::Inserted)
    }
}

/// Single-attempt fetcher with millisecond back-off.
pub fn fetcher() -> Fetcher {
    let mut config = Config::default();
    config.fetch.max_attempts = 1;
    config.fetch.base_delay_ms = 1;
    config.fetch.image_base_delay_ms = 1;
    Fetcher::new(&config.site, &config.fetch, &config.rate_limit).unwrap()
}

pub fn no_delay() -> RateLimiter {
    RateLimiter::new(Duration::ZERO, Duration::ZERO)
}
