use crate::http::Fetcher;
use crate::models::AssetPath;
use crate::rate_limit::RateLimiter;
use crate::traits::AssetStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Uploads scraped images to the asset store and answers existence checks.
///
/// Failures never propagate out of this type: uploads degrade to `None`
/// and lookups to "absent", both with a warning.
#[derive(Clone)]
pub struct AssetPublisher {
    store: Arc<dyn AssetStore>,
}

impl AssetPublisher {
    pub fn new(store: Arc<dyn AssetStore>) -> Self {
        Self { store }
    }

    /// Upload `bytes` under `path` and return the store's secure URL.
    pub async fn publish(&self, bytes: Vec<u8>, path: &AssetPath) -> Option<String> {
        let Some(leaf) = path.leaf.as_deref() else {
            warn!("[PUBLISHER] Refusing to upload to bare folder {}", path);
            return None;
        };

        match self.store.upload(bytes, &path.folder, leaf).await {
            Ok(url) => {
                debug!("[PUBLISHER] Published {} -> {}", path, url);
                Some(url)
            }
            Err(e) => {
                warn!("[PUBLISHER] Failed to upload {}: {}", path, e);
                None
            }
        }
    }

    /// Does this exact asset exist.
    pub async fn image_exists(&self, path: &AssetPath) -> bool {
        self.lookup(&path.prefix()).await
    }

    /// Does anything exist below this folder.
    pub async fn folder_exists(&self, folder: &AssetPath) -> bool {
        self.lookup(&folder.prefix()).await
    }

    async fn lookup(&self, prefix: &str) -> bool {
        match self.store.exists(prefix).await {
            Ok(found) => found,
            Err(e) => {
                warn!("[PUBLISHER] Existence check for {} failed: {}", prefix, e);
                false
            }
        }
    }

    /// Check, fetch and upload the cover. An existing cover is not fetched
    /// again; its delivery URL is returned instead.
    pub async fn publish_cover(
        &self,
        comic_slug: &str,
        cover_url: &str,
        fetcher: &Fetcher,
        limiter: &RateLimiter,
    ) -> Option<String> {
        let path = AssetPath::cover(comic_slug);

        if self.image_exists(&path).await {
            info!("[PUBLISHER] Cover image already exists. Skipping...");
            return Some(self.store.url_for(&path.to_string()));
        }

        if cover_url.is_empty() {
            warn!("[PUBLISHER] No cover image on the comic page for {}", comic_slug);
            return None;
        }

        let bytes = match limiter.limited(|| fetcher.fetch_image(cover_url)).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("[PUBLISHER] Failed to download cover {}: {}", cover_url, e);
                return None;
            }
        };

        let published = self.publish(bytes, &path).await;
        match &published {
            Some(_) => info!("[PUBLISHER] Cover image uploaded successfully"),
            None => warn!("[PUBLISHER] Failed to upload cover image"),
        }
        published
    }
}
