use crate::error::{Result, ScraperError};
use crate::models::{sort_chapters, Chapter, ComicKind, ComicMetadata, ComicStatus};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;
use url::Url;

const MISSING: &str = "N/A";

/// Everything the landing page of a comic yields.
#[derive(Debug, Clone)]
pub struct ComicPage {
    pub metadata: ComicMetadata,
    pub cover_url: String,
    pub chapters: Vec<Chapter>,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScraperError::extraction(format!("bad selector {}: {:?}", css, e)))
}

fn pattern(re: &str) -> Result<Regex> {
    Regex::new(re).map_err(|e| ScraperError::extraction(format!("bad pattern {}: {}", re, e)))
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Trimmed text of the first match, or `N/A`.
fn first_text(document: &Html, css: &str) -> Result<String> {
    let sel = selector(css)?;
    Ok(document
        .select(&sel)
        .next()
        .map(element_text)
        .unwrap_or_else(|| MISSING.to_string()))
}

/// Trimmed text of the first match whose text contains `needle`, or `N/A`.
fn first_text_containing(document: &Html, css: &str, needle: &str) -> Result<String> {
    let sel = selector(css)?;
    Ok(document
        .select(&sel)
        .map(element_text)
        .find(|text| text.contains(needle))
        .unwrap_or_else(|| MISSING.to_string()))
}

fn resolve(page_url: &Url, href: &str) -> String {
    page_url
        .join(href.trim())
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.trim().to_string())
}

/// Drop characters that are unsafe in file names on common platforms,
/// then apply NFKD normalization.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .nfkd()
        .collect::<String>()
        .trim()
        .to_string()
}

pub fn parse_comic_page(html: &str, page_url: &Url) -> Result<ComicPage> {
    let document = Html::parse_document(html);
    debug!("[SCANNER] HTML length: {}", html.len());

    Ok(ComicPage {
        metadata: extract_metadata(&document)?,
        cover_url: extract_cover_url(&document, page_url)?,
        chapters: extract_chapters(&document, page_url)?,
    })
}

pub fn extract_metadata(document: &Html) -> Result<ComicMetadata> {
    let suffix = pattern(r"(?i)\s+Bahasa Indonesia$")?;
    let raw_title = sanitize_title(&first_text(document, ".komik_info-content-body-title")?);
    let title = suffix.replace(&raw_title, "").to_string();

    let author = first_text_containing(document, ".komik_info-content-info", "Author:")?
        .replace("Author:", "")
        .trim()
        .to_string();

    let kind_text = first_text(document, ".komik_info-content-info-type a")?.to_lowercase();
    let kind = ComicKind::parse(&kind_text).unwrap_or_else(|| {
        warn!("[SCANNER] Unknown comic type '{}', assuming manga", kind_text);
        ComicKind::Manga
    });

    let status_text = first_text_containing(document, ".komik_info-content-info", "Status:")?
        .replace("Status:", "")
        .trim()
        .to_lowercase();
    let status = ComicStatus::parse(&status_text).unwrap_or_else(|| {
        warn!("[SCANNER] Unknown comic status '{}', assuming ongoing", status_text);
        ComicStatus::Ongoing
    });

    let release = first_text(document, ".komik_info-content-info-release")?
        .replace("Released:", "")
        .trim()
        .to_string();

    let genre_selector = selector(".komik_info-content-genre a")?;
    let genres: Vec<String> = document
        .select(&genre_selector)
        .map(element_text)
        .filter(|g| !g.is_empty())
        .collect();

    let synopsis = first_text(document, ".komik_info-description-sinopsis")?;

    let rating = first_text_containing(document, ".komik_info-content-rating strong", "Rating")?
        .replace("Rating ", "")
        .trim()
        .to_string();

    debug!("[SCANNER] title={} author={} genres={:?}", title, author, genres);

    Ok(ComicMetadata {
        title,
        author,
        kind,
        status,
        release,
        genres,
        synopsis,
        rating,
    })
}

/// Absolute cover image URL, empty when the page has none.
pub fn extract_cover_url(document: &Html, page_url: &Url) -> Result<String> {
    let sel = selector(".komik_info-content-thumbnail img")?;
    Ok(document
        .select(&sel)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(|src| resolve(page_url, src))
        .unwrap_or_default())
}

/// `12` from `Chapter 12`, `12.5` from `Chapter 12.5`.
pub fn parse_chapter_number(text: &str) -> Option<f64> {
    let number_regex = pattern(r"Chapter\s*([0-9]+(?:\.[0-9]+)?)").ok()?;
    number_regex
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Chapter links in ascending number order. Links without a recognizable
/// chapter number are ignored.
pub fn extract_chapters(document: &Html, page_url: &Url) -> Result<Vec<Chapter>> {
    let link_selector = selector("#chapter-wrapper > li.komik_info-chapters-item > a.chapter-link-item")?;

    let mut chapters = Vec::new();
    for link in document.select(&link_selector) {
        let text = link.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        match parse_chapter_number(&text) {
            Some(number) => chapters.push(Chapter::new(number, resolve(page_url, href))),
            None => debug!("[SCANNER] Ignoring chapter link '{}'", text),
        }
    }

    sort_chapters(&mut chapters);
    debug!("[SCANNER] Found {} chapters", chapters.len());
    Ok(chapters)
}

/// Image URLs of a chapter page in reading order.
pub fn extract_image_urls(html: &str, page_url: &Url) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let image_selector = selector("#chapter_body > .main-reading-area img")?;

    Ok(document
        .select(&image_selector)
        .filter_map(|img| img.value().attr("src"))
        .filter(|src| !src.trim().is_empty())
        .map(|src| resolve(page_url, src))
        .collect())
}
