//! Operator settings stored as RON next to the binary's working directory.
//!
//! A missing file is not an error: defaults are written back so the operator
//! has something to edit. A file that exists but cannot be read or parsed is
//! reported instead of silently replaced.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use catalog_engine::{
    write_file, BrowserSettings, FetchSettings, ImageFilters, ImageFormat, PipelineSettings,
    SessionMode, SessionSettings, SuffixBook,
};
use engine_logging::{engine_info, engine_warn};
use serde::{Deserialize, Serialize};

pub const SETTINGS_FILENAME: &str = "collector.ron";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings from {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse settings in {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: ron::error::SpannedError,
    },
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] ron::Error),
    #[error("failed to write settings to {path:?}: {message}")]
    Write { path: PathBuf, message: String },
    #[error("unknown image format `{0}`")]
    ImageFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverKind {
    /// Headless Chromium over the DevTools protocol.
    Chromium,
    /// Plain HTTP, for storefronts that render server-side.
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// `IDENTIFIER URL` list, one pair per line.
    pub links_file: PathBuf,
    pub output_root: PathBuf,
    pub driver: DriverKind,
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    pub page_timeout_secs: u64,
    pub concurrent: bool,
    pub max_in_flight: usize,
    pub recycle_every: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub batch_size: usize,
    pub attribute_name: String,
    pub images: ImageSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    pub root: PathBuf,
    pub min_width: Option<u32>,
    pub min_height: Option<u32>,
    pub min_aspect_ratio: Option<f32>,
    /// File extension such as `"webp"`; `None` accepts every format.
    pub format: Option<String>,
    pub suffixes: Vec<String>,
    /// Product name to its own suffix list.
    pub product_suffixes: BTreeMap<String, Vec<String>>,
}

impl Default for AppSettings {
    fn default() -> Self {
        let session = SessionSettings::default();
        let browser = BrowserSettings::default();
        Self {
            links_file: PathBuf::from("links.txt"),
            output_root: PathBuf::from("output"),
            driver: DriverKind::Chromium,
            chrome_path: None,
            headless: browser.headless,
            page_timeout_secs: browser.page_timeout.as_secs(),
            concurrent: false,
            max_in_flight: session.max_in_flight,
            recycle_every: session.recycle_every,
            min_delay_ms: session.min_delay.as_millis() as u64,
            max_delay_ms: session.max_delay.as_millis() as u64,
            batch_size: catalog_engine::ExportOptions::default().batch_size,
            attribute_name: catalog_engine::DEFAULT_ATTRIBUTE_NAME.to_string(),
            images: ImageSettings::default(),
        }
    }
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("images"),
            min_width: Some(500),
            min_height: None,
            min_aspect_ratio: None,
            format: None,
            suffixes: Vec::new(),
            product_suffixes: BTreeMap::new(),
        }
    }
}

impl AppSettings {
    /// Reads `path`, writing the defaults there first when it does not exist.
    pub fn load_or_init(path: &Path) -> Result<Self, SettingsError> {
        let content = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                engine_warn!("Settings file {:?} missing; writing defaults", path);
                let defaults = Self::default();
                defaults.save(path)?;
                return Ok(defaults);
            }
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let settings = ron::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        engine_info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let pretty = ron::ser::PrettyConfig::new();
        let content = ron::ser::to_string_pretty(self, pretty)?;
        write_file(path, content).map_err(|err| SettingsError::Write {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Ok(())
    }

    pub fn session(&self, force_concurrent: bool) -> SessionSettings {
        SessionSettings {
            mode: if self.concurrent || force_concurrent {
                SessionMode::Concurrent
            } else {
                SessionMode::Synchronous
            },
            recycle_every: self.recycle_every,
            min_delay: Duration::from_millis(self.min_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms.max(self.min_delay_ms)),
            max_in_flight: self.max_in_flight.max(1),
        }
    }

    pub fn browser(&self) -> BrowserSettings {
        BrowserSettings {
            chrome_path: self.chrome_path.clone(),
            headless: self.headless,
            page_timeout: Duration::from_secs(self.page_timeout_secs.max(1)),
            ..BrowserSettings::default()
        }
    }

    pub fn fetch(&self) -> FetchSettings {
        FetchSettings {
            request_timeout: Duration::from_secs(self.page_timeout_secs.max(1)),
            ..FetchSettings::default()
        }
    }

    pub fn pipeline(&self, force_concurrent: bool) -> PipelineSettings {
        let mut settings =
            PipelineSettings::new(&self.output_root).with_session(self.session(force_concurrent));
        settings.export.batch_size = self.batch_size.max(1);
        settings.attribute_name = self.attribute_name.clone();
        settings
    }
}

impl ImageSettings {
    pub fn filters(&self) -> Result<ImageFilters, SettingsError> {
        let required_format = match self.format.as_deref() {
            None | Some("") => None,
            Some(ext) => Some(
                ImageFormat::from_extension(ext)
                    .ok_or_else(|| SettingsError::ImageFormat(ext.to_string()))?,
            ),
        };
        Ok(ImageFilters {
            min_width: self.min_width,
            min_height: self.min_height,
            min_aspect_ratio: self.min_aspect_ratio,
            required_format,
        })
    }

    pub fn suffix_book(&self) -> SuffixBook {
        self.product_suffixes.iter().fold(
            SuffixBook::new(self.suffixes.clone()),
            |book, (product, list)| book.with_product(product, list.clone()),
        )
    }
}
