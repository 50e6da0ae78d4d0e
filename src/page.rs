use scraper::Html;
use tracing::debug;
use url::Url;

use crate::config::PageSelectors;
use crate::models::{DatePath, PageResult};

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid page URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("request for {url} failed: {reason}")]
    Request { url: String, reason: String },
    #[error("status code error for {url}: {status}")]
    Status { url: String, status: reqwest::StatusCode },
    #[error("{url} did not return HTML (content-type {content_type:?})")]
    NotHtml { url: String, content_type: String },
    #[error("failed to read body of {url}: {reason}")]
    Body { url: String, reason: String },
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Fetches one archive page and extracts its comic image, next link and date.
pub async fn fetch_page(
    client: &reqwest::Client,
    page_url: &str,
    selectors: &PageSelectors,
) -> Result<PageResult, FetchError> {
    Url::parse(page_url).map_err(|e| FetchError::InvalidUrl {
        url: page_url.to_string(),
        reason: e.to_string(),
    })?;
    let (html, final_url) = fetch_html(client, page_url).await?;
    debug!("fetched {} from {} ({} bytes)", page_url, final_url, html.len());
    Ok(extract_page(&html, &final_url, page_url, selectors))
}

// ── HTTP fetch ───────────────────────────────────────────────────────────────

/// Returns the body together with the URL it was served from after redirects.
async fn fetch_html(client: &reqwest::Client, url: &str) -> Result<(String, Url), FetchError> {
    let response = client.get(url).send().await.map_err(|e| {
        let reason = if e.is_timeout() {
            format!("TimeoutError: {}", e)
        } else if e.is_connect() {
            format!("ConnectError: {}", e)
        } else {
            format!("RequestError: {}", e)
        };
        FetchError::Request {
            url: url.to_string(),
            reason,
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status,
        });
    }

    // An absent or empty content-type is parsed as HTML.
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .trim()
        .to_lowercase();

    if !content_type.is_empty() && !content_type.contains("html") {
        return Err(FetchError::NotHtml {
            url: url.to_string(),
            content_type,
        });
    }

    let final_url = response.url().clone();
    let html = response.text().await.map_err(|e| FetchError::Body {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    Ok((html, final_url))
}

// ── Extraction ───────────────────────────────────────────────────────────────

/// Pulls the first content image and the first next-page anchor out of `html`.
///
/// Relative `src`/`href` values are resolved against `base`, the URL the page
/// was actually served from. The date comes from the requested `page_url`. A
/// missing image or anchor is reported as `None`, never as an error.
pub fn extract_page(
    html: &str,
    base: &Url,
    page_url: &str,
    selectors: &PageSelectors,
) -> PageResult {
    let document = Html::parse_document(html);

    let image_url = document
        .select(&selectors.content_image)
        .next()
        .and_then(|el| el.value().attr("src"))
        .and_then(|src| resolve(base, src));

    let next_page_url = document
        .select(&selectors.next_link)
        .next()
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| resolve(base, href));

    PageResult {
        served_url: base.to_string(),
        image_url,
        next_page_url,
        date: DatePath::from_url(page_url),
    }
}

fn resolve(base: &Url, reference: &str) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }
    Some(
        base.join(reference)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| reference.to_string()),
    )
}
