use std::collections::HashMap;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use catalog_core::{RunHooks, StageStatus, StageTracker, WorkItem};
use engine_logging::{engine_debug, engine_info};
use image::{ImageFormat, ImageReader};
use regex::Regex;
use scraper::Html;
use tempfile::NamedTempFile;

use crate::dedup::{ContentDigest, Deduplicator};
use crate::fetch::ReqwestDriver;
use crate::filename::slugify;
use crate::persist::{ensure_output_dir, persist_new, PersistError};
use crate::rules::{gallery_images, page_title, product_name_rules};
use crate::session::BrowserSession;
use crate::{FailureKind, ItemError};

static SIZE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-_]\d{3,4}(?:x\d{3,4})?").expect("static size pattern"));

/// Acceptance rules applied to each downloaded image before it is kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageFilters {
    pub min_width: Option<u32>,
    pub min_height: Option<u32>,
    /// Minimum width / height.
    pub min_aspect_ratio: Option<f32>,
    pub required_format: Option<ImageFormat>,
}

impl ImageFilters {
    /// `None` when the image passes, otherwise why it was rejected.
    pub fn rejection(&self, format: Option<ImageFormat>, width: u32, height: u32) -> Option<String> {
        if let Some(required) = self.required_format {
            if format != Some(required) {
                return Some(format!("format {format:?} is not {required:?}"));
            }
        }
        if let Some(min) = self.min_width {
            if width < min {
                return Some(format!("width {width} below {min}"));
            }
        }
        if let Some(min) = self.min_height {
            if height < min {
                return Some(format!("height {height} below {min}"));
            }
        }
        if let Some(min) = self.min_aspect_ratio {
            let ratio = width as f32 / height.max(1) as f32;
            if ratio < min {
                return Some(format!("aspect ratio {ratio:.2} below {min}"));
            }
        }
        None
    }
}

/// Per-product filename suffixes, cycled in order. Products without their own
/// list use the default one.
#[derive(Debug, Clone, Default)]
pub struct SuffixBook {
    by_product: HashMap<String, Vec<String>>,
    default: Vec<String>,
    cursor: HashMap<String, usize>,
}

impl SuffixBook {
    pub fn new(default: Vec<String>) -> Self {
        Self {
            default,
            ..Self::default()
        }
    }

    /// Suffixes for one product, keyed by the product's slug.
    pub fn with_product(mut self, product: &str, suffixes: Vec<String>) -> Self {
        self.by_product.insert(slugify(product), suffixes);
        self
    }

    pub fn next_for(&mut self, product_slug: &str) -> Option<String> {
        let list = self
            .by_product
            .get(product_slug)
            .filter(|l| !l.is_empty())
            .unwrap_or(&self.default);
        if list.is_empty() {
            return None;
        }
        let cursor = self.cursor.entry(product_slug.to_string()).or_insert(0);
        let suffix = list[*cursor % list.len()].clone();
        *cursor += 1;
        Some(suffix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetOutcome {
    Saved(PathBuf),
    Duplicate,
    Rejected(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageReport {
    pub pages_ok: usize,
    pub pages_failed: usize,
    pub saved: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub failed: usize,
    pub cancelled: bool,
    /// The browser session was lost; pages after it count as failed.
    pub aborted: bool,
}

impl ImageReport {
    pub fn status(&self) -> StageStatus {
        if self.aborted {
            StageStatus::Aborted
        } else if self.cancelled {
            StageStatus::Cancelled
        } else {
            StageStatus::Completed
        }
    }

    pub fn line(&self) -> String {
        format!(
            "images: {} pages ok, {} pages failed, {} saved, {} duplicates, {} rejected, {} failed{}",
            self.pages_ok,
            self.pages_failed,
            self.saved,
            self.duplicates,
            self.rejected,
            self.failed,
            match self.status() {
                StageStatus::Aborted => " (aborted)",
                StageStatus::Cancelled => " (cancelled)",
                _ => "",
            }
        )
    }

    pub fn interrupted(&self) -> bool {
        self.cancelled || self.aborted
    }
}

/// Downloads product gallery images into one folder per product, keeping
/// only images that pass the filters and were never stored before.
pub struct ImageCollector {
    dest: PathBuf,
    filters: ImageFilters,
    suffixes: SuffixBook,
    downloader: ReqwestDriver,
    dedup: Deduplicator,
}

impl ImageCollector {
    /// Seeds the duplicate set from everything already under `dest`.
    pub fn new(
        dest: impl Into<PathBuf>,
        filters: ImageFilters,
        suffixes: SuffixBook,
        downloader: ReqwestDriver,
    ) -> Result<Self, PersistError> {
        let dest = dest.into();
        ensure_output_dir(&dest)?;
        let dedup = Deduplicator::seed_from(&dest)?;
        Ok(Self {
            dest,
            filters,
            suffixes,
            downloader,
            dedup,
        })
    }

    pub fn known_assets(&self) -> usize {
        self.dedup.len()
    }

    /// Visits each product page in order. Cancellation is polled before each
    /// page and before each image.
    pub async fn collect(
        &mut self,
        items: &[WorkItem],
        session: &dyn BrowserSession,
        hooks: &RunHooks,
    ) -> ImageReport {
        let mut report = ImageReport::default();
        let tracker = StageTracker::new(items.len(), hooks.progress.clone());
        'pages: for (index, item) in items.iter().enumerate() {
            if hooks.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let html = match session.fetch_page_content(&item.source_url).await {
                Ok(html) => html,
                Err(err) => {
                    report.pages_failed += 1;
                    hooks.line(format!("[images] {} failed: {err}", item.identifier));
                    tracker.item_done();
                    if err.is_session_fatal() {
                        let remaining = items.len() - index - 1;
                        report.pages_failed += remaining;
                        report.aborted = true;
                        hooks.line(format!(
                            "[images] browser session lost; {remaining} pages not visited"
                        ));
                        break;
                    }
                    continue;
                }
            };
            let (product, sources) = gallery_of(&html, item);
            let slug = match slugify(&product) {
                s if s.is_empty() => slugify(&item.identifier),
                s => s,
            };
            let folder = self.dest.join(&slug);
            engine_debug!("{}: {} gallery images for {slug}", item.identifier, sources.len());

            for src in sources {
                if hooks.is_cancelled() {
                    report.cancelled = true;
                    break 'pages;
                }
                match self.store_candidate(&src, &folder, &slug).await {
                    Ok(AssetOutcome::Saved(path)) => {
                        report.saved += 1;
                        hooks.line(format!("[images] saved {}", path.display()));
                    }
                    Ok(AssetOutcome::Duplicate) => {
                        report.duplicates += 1;
                        hooks.line(format!("[images] duplicate skipped: {src}"));
                    }
                    Ok(AssetOutcome::Rejected(reason)) => {
                        report.rejected += 1;
                        hooks.line(format!("[images] rejected {src}: {reason}"));
                    }
                    Err(err) => {
                        report.failed += 1;
                        hooks.line(format!("[images] {src} failed: {err}"));
                    }
                }
            }
            report.pages_ok += 1;
            tracker.item_done();
        }
        tracker.settle();
        engine_info!("{}", report.line());
        report
    }

    /// Downloads one image to a temp file beside its final location, then
    /// filters, deduplicates and names it. Nothing partial is ever left at a
    /// final path.
    pub async fn store_candidate(
        &mut self,
        src: &str,
        folder: &Path,
        product_slug: &str,
    ) -> Result<AssetOutcome, ItemError> {
        ensure_output_dir(folder)?;
        let mut tmp = NamedTempFile::new_in(folder)?;
        self.downloader.download_to(src, tmp.as_file_mut()).await?;

        let file = tmp.as_file_mut();
        file.seek(SeekFrom::Start(0))?;
        let reader = ImageReader::new(std::io::BufReader::new(&*file)).with_guessed_format()?;
        let format = reader.format();
        let (width, height) = reader
            .into_dimensions()
            .map_err(|err| ItemError::new(FailureKind::Decode, err.to_string()))?;
        if let Some(reason) = self.filters.rejection(format, width, height) {
            return Ok(AssetOutcome::Rejected(reason));
        }

        file.seek(SeekFrom::Start(0))?;
        let digest = ContentDigest::of_reader(&*file)?;
        if self.dedup.contains(&digest) {
            return Ok(AssetOutcome::Duplicate);
        }

        let title = image_title(src);
        let stem = match self.suffixes.next_for(product_slug) {
            Some(suffix) => slugify(&format!("{title} {suffix}")),
            None => slugify(&title),
        };
        let stem = if stem.is_empty() { digest.to_string()[..12].to_string() } else { stem };
        let ext = format
            .and_then(|f| f.extensions_str().first().copied())
            .unwrap_or("img");
        let path = persist_new(tmp, folder, &stem, ext)?;
        self.dedup.remember(digest);
        Ok(AssetOutcome::Saved(path))
    }
}

/// Product label and image URLs from a rendered product page.
fn gallery_of(html: &str, item: &WorkItem) -> (String, Vec<String>) {
    let doc = Html::parse_document(html);
    let product = page_title(&doc)
        .or_else(|| product_name_rules().first_match(&doc))
        .unwrap_or_else(|| item.identifier.clone());
    let sources = gallery_images(&doc, &item.source_url);
    (product, sources)
}

/// Readable title from an image URL: file name up to the first dot, size
/// markers such as `-1200` removed, dashes read as spaces.
pub fn image_title(src: &str) -> String {
    let path = src.split(['?', '#']).next().unwrap_or(src);
    let file = path.rsplit('/').next().unwrap_or(path);
    let stem = file.split('.').next().unwrap_or(file);
    let stripped = SIZE_MARKER.replace_all(stem, "");
    stripped
        .split(['-', '_'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use image::ImageFormat;

    use super::{image_title, ImageFilters, SuffixBook};

    #[test]
    fn titles_drop_size_markers() {
        assert_eq!(
            image_title("https://cdn.example/files/blue-mug-1200x1200.webp?v=3"),
            "blue mug"
        );
        assert_eq!(image_title("/a/tea_pot-800.jpg"), "tea pot");
    }

    #[test]
    fn filters_check_each_bound() {
        let filters = ImageFilters {
            min_width: Some(500),
            min_height: None,
            min_aspect_ratio: Some(0.5),
            required_format: Some(ImageFormat::WebP),
        };
        assert!(filters.rejection(Some(ImageFormat::WebP), 800, 800).is_none());
        assert!(filters.rejection(Some(ImageFormat::Png), 800, 800).is_some());
        assert!(filters.rejection(Some(ImageFormat::WebP), 400, 800).is_some());
        assert!(filters.rejection(Some(ImageFormat::WebP), 600, 1300).is_some());
    }

    #[test]
    fn suffixes_rotate_per_product() {
        let mut book = SuffixBook::new(vec!["front".into(), "side".into()])
            .with_product("Blue Mug", vec!["a".into()]);
        assert_eq!(book.next_for("blue-mug").as_deref(), Some("a"));
        assert_eq!(book.next_for("blue-mug").as_deref(), Some("a"));
        assert_eq!(book.next_for("tea-pot").as_deref(), Some("front"));
        assert_eq!(book.next_for("tea-pot").as_deref(), Some("side"));
        assert_eq!(book.next_for("tea-pot").as_deref(), Some("front"));
    }
}
