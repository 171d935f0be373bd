use crate::error::Result;
use crate::models::{Comic, UpsertOutcome};

/// Remote blob store holding comic covers and chapter images.
#[async_trait::async_trait]
pub trait AssetStore: Send + Sync {
    /// True when at least one stored asset's path starts with `prefix`.
    async fn exists(&self, prefix: &str) -> Result<bool>;

    /// Store `bytes` as `folder/public_id`, replacing anything already
    /// there, and return the asset's secure URL.
    async fn upload(&self, bytes: Vec<u8>, folder: &str, public_id: &str) -> Result<String>;

    /// Delivery URL of the asset stored at `path`.
    fn url_for(&self, path: &str) -> String;
}

/// Relational store for comic metadata.
#[async_trait::async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert `comic` if its slug is new, otherwise refresh only its
    /// `updated_on` timestamp.
    async fn upsert_by_slug(&self, comic: &Comic) -> Result<UpsertOutcome>;
}
