use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::cmp::Ordering;
use std::fmt;

/// One chapter link from the comic landing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub number: f64,
    pub source_url: String,
}

impl Chapter {
    pub fn new(number: f64, source_url: impl Into<String>) -> Self {
        Self {
            number,
            source_url: source_url.into(),
        }
    }

    /// `12` for whole numbers, `12.5` otherwise.
    pub fn label(&self) -> String {
        format_chapter_number(self.number)
    }
}

pub fn format_chapter_number(number: f64) -> String {
    if number.fract() == 0.0 {
        format!("{}", number as i64)
    } else {
        format!("{}", number)
    }
}

pub fn sort_chapters(chapters: &mut [Chapter]) {
    chapters.sort_by(|a, b| a.number.partial_cmp(&b.number).unwrap_or(Ordering::Equal));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "comic_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ComicKind {
    Manga,
    Manhwa,
    Manhua,
}

impl ComicKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "manga" => Some(Self::Manga),
            "manhwa" => Some(Self::Manhwa),
            "manhua" => Some(Self::Manhua),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manga => "manga",
            Self::Manhwa => "manhwa",
            Self::Manhua => "manhua",
        }
    }
}

impl fmt::Display for ComicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "comic_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ComicStatus {
    Ongoing,
    Completed,
}

impl ComicStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "ongoing" => Some(Self::Ongoing),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for ComicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata scraped from the landing page, before the cover is published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComicMetadata {
    pub title: String,
    pub author: String,
    pub kind: ComicKind,
    pub status: ComicStatus,
    pub release: String,
    pub genres: Vec<String>,
    pub synopsis: String,
    pub rating: String,
}

/// A comic as written to the metadata store. Identity is `slug`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comic {
    pub slug: String,
    pub title: String,
    pub author: String,
    pub kind: ComicKind,
    pub status: ComicStatus,
    pub release: String,
    pub genres: Vec<String>,
    pub synopsis: String,
    pub rating: String,
    pub cover_asset_ref: String,
}

impl Comic {
    pub fn from_metadata(slug: impl Into<String>, meta: ComicMetadata, cover_asset_ref: String) -> Self {
        Self {
            slug: slug.into(),
            title: meta.title,
            author: meta.author,
            kind: meta.kind,
            status: meta.status,
            release: meta.release,
            genres: meta.genres,
            synopsis: meta.synopsis,
            rating: meta.rating,
            cover_asset_ref,
        }
    }
}

/// Row shape of the `comics` table.
#[derive(Debug, Clone, FromRow)]
pub struct ComicRow {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub author: String,
    pub kind: ComicKind,
    pub status: ComicStatus,
    pub release: String,
    pub genres: String,
    pub synopsis: String,
    pub rating: String,
    pub cover_asset_ref: String,
    pub created_at: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Touched,
}

/// Logical location in the asset store: a folder plus an optional leaf.
///
/// `alpha/chapter-3` is a chapter folder, `alpha/chapter-3/001` an image
/// inside it and `alpha/cover` the cover.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetPath {
    pub folder: String,
    pub leaf: Option<String>,
}

impl AssetPath {
    pub fn chapter_folder(slug: &str, chapter: &Chapter) -> Self {
        Self {
            folder: format!("{}/chapter-{}", slug, chapter.label()),
            leaf: None,
        }
    }

    pub fn cover(slug: &str) -> Self {
        Self {
            folder: slug.to_string(),
            leaf: Some("cover".to_string()),
        }
    }

    /// Leaf named after the image file with its extension stripped. URLs
    /// without a file name fall back to `image-NNN` from the 1-based
    /// `position` in the chapter.
    pub fn image(&self, image_url: &str, position: usize) -> Self {
        let stem = image_stem(image_url);
        let leaf = if stem.is_empty() {
            format!("image-{:03}", position)
        } else {
            stem
        };
        Self {
            folder: self.folder.clone(),
            leaf: Some(leaf),
        }
    }

    /// Key for a folder query. The trailing slash keeps `chapter-1` from
    /// matching `chapter-12`.
    pub fn prefix(&self) -> String {
        match &self.leaf {
            Some(leaf) => format!("{}/{}", self.folder, leaf),
            None => format!("{}/", self.folder),
        }
    }
}

impl fmt::Display for AssetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.leaf {
            Some(leaf) => write!(f, "{}/{}", self.folder, leaf),
            None => write!(f, "{}", self.folder),
        }
    }
}

/// Last path segment of a URL up to its first `.`, ignoring query strings.
pub fn image_stem(image_url: &str) -> String {
    let path = match url::Url::parse(image_url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => image_url.split(&['?', '#'][..]).next().unwrap_or_default().to_string(),
    };
    let file_name = path.rsplit('/').next().unwrap_or_default();
    file_name.split('.').next().unwrap_or_default().to_string()
}

/// One chapter scheduled for download.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub comic_slug: String,
    pub chapter: Chapter,
}

impl DownloadTask {
    pub fn new(comic_slug: impl Into<String>, chapter: Chapter) -> Self {
        Self {
            comic_slug: comic_slug.into(),
            chapter,
        }
    }

    pub fn folder(&self) -> AssetPath {
        AssetPath::chapter_folder(&self.comic_slug, &self.chapter)
    }
}

/// Terminal state of one chapter pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ChapterOutcome {
    Skipped,
    Done { uploaded: Vec<String>, attempted: usize },
    Failed { reason: String },
}

/// `dispatched` counts chapters handed to the scheduler. `skipped` also
/// includes chapters whose folder already existed before dispatch; chapters
/// below the starting number are not counted anywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub dispatched: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub images_uploaded: usize,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[ChapterOutcome]) -> Self {
        let mut summary = Self {
            dispatched: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome {
                ChapterOutcome::Skipped => summary.skipped += 1,
                ChapterOutcome::Done { uploaded, .. } => {
                    summary.completed += 1;
                    summary.images_uploaded += uploaded.len();
                }
                ChapterOutcome::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} dispatched, {} completed, {} skipped, {} failed, {} images uploaded",
            self.dispatched, self.completed, self.skipped, self.failed, self.images_uploaded
        )
    }
}
