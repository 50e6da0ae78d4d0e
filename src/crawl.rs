use std::collections::HashSet;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::config::{ConfigError, CrawlConfig, ImageErrorPolicy, PageErrorPolicy, PageSelectors};
use crate::models::{CrawlSummary, DatePath, PageResult, StopReason};
use crate::page::{fetch_page, FetchError};
use crate::transform::{download_image, TransformError};

const USER_AGENT: &str = concat!("comic-archiver/", env!("CARGO_PKG_VERSION"));

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error(transparent)]
    Page(#[from] FetchError),
    #[error("failed to save image {url}: {source}")]
    Image {
        url: String,
        #[source]
        source: TransformError,
    },
}

// ── State machine ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlState {
    Running(String),
    Done(StopReason),
}

/// Walks the archive chain one page at a time, saving each page's image.
pub struct Crawler {
    config: CrawlConfig,
    client: reqwest::Client,
    selectors: PageSelectors,
}

impl Crawler {
    pub fn new(config: CrawlConfig) -> Result<Self, CrawlError> {
        config.validate()?;
        let selectors = config.selectors()?;

        let client = reqwest::ClientBuilder::new()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CrawlError::Client(e.to_string()))?;

        Ok(Self {
            config,
            client,
            selectors,
        })
    }

    /// Runs until the chain ends. Each page and its image complete before the
    /// next page is requested.
    pub async fn run(&self) -> Result<CrawlSummary, CrawlError> {
        let mut summary = CrawlSummary::default();
        let mut visited: HashSet<String> = HashSet::new();
        let mut state = CrawlState::Running(self.config.genesis_url.clone());

        info!("Starting crawl at {}", self.config.genesis_url);

        loop {
            match state {
                CrawlState::Running(url) => {
                    state = self.step(url, &mut visited, &mut summary).await?;
                }
                CrawlState::Done(reason) => {
                    summary.stop_reason = Some(reason);
                    break;
                }
            }
        }

        info!(
            "Crawl finished ({:?}): {} pages, {} images saved, {} failed",
            summary.stop_reason, summary.pages_visited, summary.images_saved, summary.images_failed
        );
        Ok(summary)
    }

    async fn step(
        &self,
        url: String,
        visited: &mut HashSet<String>,
        summary: &mut CrawlSummary,
    ) -> Result<CrawlState, CrawlError> {
        visited.insert(url.clone());

        let page = match fetch_page(&self.client, &url, &self.selectors).await {
            Ok(page) => page,
            Err(e) => match self.config.page_error_policy {
                PageErrorPolicy::Fatal => return Err(CrawlError::Page(e)),
                PageErrorPolicy::Stop => {
                    warn!("Stopping crawl at {}: {}", url, e);
                    return Ok(CrawlState::Done(StopReason::PageError));
                }
            },
        };
        summary.pages_visited += 1;
        visited.insert(page.served_url.clone());

        if let Some(image_url) = &page.image_url {
            self.save_image(image_url, &page.date, summary).await?;
        }

        info!(
            "Processed page {}: image={:?} next={:?}",
            url, page.image_url, page.next_page_url
        );

        Ok(self.next_state(page, visited, summary))
    }

    async fn save_image(
        &self,
        image_url: &str,
        date: &DatePath,
        summary: &mut CrawlSummary,
    ) -> Result<(), CrawlError> {
        summary.images_found += 1;
        info!("Downloading image {}", image_url);

        if date.is_empty() {
            warn!("No date in page URL, saving {} as {}", image_url, date.file_name());
        }
        let dest = self.destination(date);

        match download_image(&self.client, image_url, &dest, self.config.resize_multiplier).await {
            Ok((width, height)) => {
                summary.images_saved += 1;
                debug!("Saved {} ({}x{})", dest.display(), width, height);
                Ok(())
            }
            Err(e) => {
                summary.images_failed += 1;
                match self.config.image_error_policy {
                    ImageErrorPolicy::SkipAndLog => {
                        warn!("Skipping image {}: {}", image_url, e);
                        Ok(())
                    }
                    ImageErrorPolicy::Abort => Err(CrawlError::Image {
                        url: image_url.to_string(),
                        source: e,
                    }),
                }
            }
        }
    }

    fn next_state(
        &self,
        page: PageResult,
        visited: &HashSet<String>,
        summary: &CrawlSummary,
    ) -> CrawlState {
        match page.next_page_url {
            None => CrawlState::Done(StopReason::EndOfChain),
            Some(next) if visited.contains(&next) => {
                warn!("{} was already visited, stopping", next);
                CrawlState::Done(StopReason::CycleDetected)
            }
            Some(_)
                if self
                    .config
                    .max_pages
                    .is_some_and(|max| summary.pages_visited >= max) =>
            {
                info!("Reached page limit of {:?}", self.config.max_pages);
                CrawlState::Done(StopReason::PageLimit)
            }
            Some(next) => CrawlState::Running(next),
        }
    }

    /// `<output_dir>/<year>-<month>-<day>.jpg`
    pub fn destination(&self, date: &DatePath) -> PathBuf {
        self.config.output_dir.join(date.file_name())
    }
}
