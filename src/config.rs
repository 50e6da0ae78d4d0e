use std::path::{Path, PathBuf};
use std::time::Duration;

use scraper::Selector;
use serde::Deserialize;
use url::Url;

// ── Constants ────────────────────────────────────────────────────────────────

pub const GENESIS_URL: &str = "https://www.commitstrip.com/en/2012/02/22/interview/";
pub const DOWNLOAD_DIRECTORY: &str = "download";
pub const DEFAULT_RESIZE_MULTIPLIER: u32 = 2;
pub const CONTENT_IMAGE_SELECTOR: &str = ".entry-content img";
pub const NEXT_LINK_SELECTOR: &str = ".nav-single .nav-next a";

/// Names a JSON file whose fields override the compiled-in defaults.
pub const CONFIG_ENV_VAR: &str = "COMIC_ARCHIVER_CONFIG";

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Policies ─────────────────────────────────────────────────────────────────

/// What the crawl does when a page cannot be fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageErrorPolicy {
    /// Abort the whole run with an error.
    #[default]
    Fatal,
    /// Treat the unreadable page as the end of the chain.
    Stop,
}

/// What the crawl does when one image fails to download or transform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageErrorPolicy {
    #[default]
    SkipAndLog,
    Abort,
}

// ── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrawlConfig {
    pub genesis_url: String,
    pub output_dir: PathBuf,
    pub resize_multiplier: u32,
    pub content_image_selector: String,
    pub next_link_selector: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub page_error_policy: PageErrorPolicy,
    pub image_error_policy: ImageErrorPolicy,
    /// Upper bound on fetched pages; unbounded when `None`.
    pub max_pages: Option<usize>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            genesis_url: GENESIS_URL.to_string(),
            output_dir: PathBuf::from(DOWNLOAD_DIRECTORY),
            resize_multiplier: DEFAULT_RESIZE_MULTIPLIER,
            content_image_selector: CONTENT_IMAGE_SELECTOR.to_string(),
            next_link_selector: NEXT_LINK_SELECTOR.to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            page_error_policy: PageErrorPolicy::default(),
            image_error_policy: ImageErrorPolicy::default(),
            max_pages: None,
        }
    }
}

impl CrawlConfig {
    /// Defaults, overridden by the file named in `COMIC_ARCHIVER_CONFIG` if set.
    pub fn load() -> Result<Self, ConfigError> {
        let config = match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) if !path.is_empty() => Self::from_path(Path::new(&path))?,
            _ => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resize_multiplier == 0 {
            return Err(ConfigError::Invalid(
                "resize_multiplier must be at least 1".to_string(),
            ));
        }
        if self.max_pages == Some(0) {
            return Err(ConfigError::Invalid(
                "max_pages must be at least 1 when set".to_string(),
            ));
        }
        Url::parse(&self.genesis_url).map_err(|e| {
            ConfigError::Invalid(format!("genesis_url {:?}: {}", self.genesis_url, e))
        })?;
        self.selectors()?;
        Ok(())
    }

    pub fn selectors(&self) -> Result<PageSelectors, ConfigError> {
        PageSelectors::new(&self.content_image_selector, &self.next_link_selector)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Compiled CSS selectors locating the comic image and the next-page anchor.
#[derive(Debug, Clone)]
pub struct PageSelectors {
    pub content_image: Selector,
    pub next_link: Selector,
}

impl PageSelectors {
    pub fn new(content_image: &str, next_link: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            content_image: parse_selector(content_image)?,
            next_link: parse_selector(next_link)?,
        })
    }
}

impl Default for PageSelectors {
    fn default() -> Self {
        Self {
            content_image: Selector::parse(CONTENT_IMAGE_SELECTOR).unwrap(),
            next_link: Selector::parse(NEXT_LINK_SELECTOR).unwrap(),
        }
    }
}

fn parse_selector(source: &str) -> Result<Selector, ConfigError> {
    // Map immediately so the borrowed SelectorErrorKind does not outlive `source`.
    Selector::parse(source)
        .map_err(|e| ConfigError::Invalid(format!("selector {:?}: {}", source, e)))
}
