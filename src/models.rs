use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static DATE_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})/(\d{2})/(\d{2})").unwrap());

/// Year, month and day taken verbatim from a `yyyy/mm/dd` segment of a page URL.
///
/// All three components are empty when the URL carries no such segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatePath {
    pub year: String,
    pub month: String,
    pub day: String,
}

impl DatePath {
    pub fn from_url(url: &str) -> Self {
        match DATE_PATH_RE.captures(url) {
            Some(cap) => Self {
                year: cap[1].to_string(),
                month: cap[2].to_string(),
                day: cap[3].to_string(),
            },
            None => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.year.is_empty() && self.month.is_empty() && self.day.is_empty()
    }

    /// `<year>-<month>-<day>.jpg`, or `--.jpg` for an unmatched URL.
    pub fn file_name(&self) -> String {
        format!("{}-{}-{}.jpg", self.year, self.month, self.day)
    }
}

/// What a single archive page yields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageResult {
    /// Where the page was served from after redirects.
    pub served_url: String,
    pub image_url: Option<String>,
    pub next_page_url: Option<String>,
    pub date: DatePath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndOfChain,
    CycleDetected,
    PageLimit,
    PageError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlSummary {
    pub pages_visited: usize,
    pub images_found: usize,
    pub images_saved: usize,
    pub images_failed: usize,
    pub stop_reason: Option<StopReason>,
}
