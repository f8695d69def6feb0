use std::fmt;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, USER_AGENT};
use scraper::{Html, Selector};
use log::{info, warn, debug};
use url::Url;

use crate::error::{FinderError, ScanError};
use crate::settings::FinderSettings;

pub const NOT_FOUND: &str = "Not found";
pub const FETCH_ERROR: &str = "Error fetching site";

/// Substrings that mark an anchor as investor or report material.
pub const REPORT_KEYWORDS: [&str; 5] = ["annual-report", "investor", "financials", "reports", "fund"];

const ANCHOR_SELECTOR: &str = "a[href]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Found(String),
    NotFound,
    FetchError(String),
}

impl fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanOutcome::Found(url) => write!(f, "{}", url),
            ScanOutcome::NotFound => write!(f, "{}", NOT_FOUND),
            ScanOutcome::FetchError(_) => write!(f, "{}", FETCH_ERROR),
        }
    }
}

pub trait LinkScanner {
    fn scan(&self, website: &str) -> ScanOutcome;
}

pub struct ReportScanner {
    client: Client,
}

impl ReportScanner {
    pub fn new(settings: &FinderSettings) -> Result<Self, FinderError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        // An agent string that is not a valid header value falls back to the default.
        let ua = HeaderValue::from_str(&settings.user_agent)
            .unwrap_or_else(|_| HeaderValue::from_static("Mozilla/5.0"));
        headers.insert(USER_AGENT, ua);

        let client = Client::builder()
            .timeout(settings.fetch_timeout())
            .default_headers(headers)
            .cookie_store(true)
            .build()?;

        Ok(ReportScanner { client })
    }

    pub fn try_scan(&self, website: &str) -> Result<Option<String>, ScanError> {
        info!("Visiting: {}", website);
        let resp = self
            .client
            .get(website)
            .send()
            .map_err(ScanError::SiteUnreachable)?;

        let status = resp.status();
        if !status.is_success() {
            // The body is still scanned; error pages often keep the site navigation.
            warn!("{} answered with {}", website, status);
        }
        let html = resp.text().map_err(ScanError::Body)?;
        find_report_link(&html, website)
    }
}

impl LinkScanner for ReportScanner {
    fn scan(&self, website: &str) -> ScanOutcome {
        match self.try_scan(website) {
            Ok(Some(url)) => {
                info!("Found report link on {}: {}", website, url);
                ScanOutcome::Found(url)
            }
            Ok(None) => {
                info!("No report link on {}", website);
                ScanOutcome::NotFound
            }
            Err(e) => {
                warn!("Failed to fetch {}: {}", website, e);
                ScanOutcome::FetchError(e.to_string())
            }
        }
    }
}

/// First anchor, in document order, whose href or visible text contains a
/// report keyword. Relative targets are joined onto `website`.
pub fn find_report_link(html: &str, website: &str) -> Result<Option<String>, ScanError> {
    let selector = Selector::parse(ANCHOR_SELECTOR).map_err(|e| ScanError::Parse(e.to_string()))?;
    let document = Html::parse_document(html);

    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        let href_lower = href.to_lowercase();
        let text_lower = element
            .text()
            .map(str::trim)
            .collect::<String>()
            .to_lowercase();

        let hit = REPORT_KEYWORDS
            .iter()
            .find(|kw| href_lower.contains(*kw) || text_lower.contains(*kw));
        if let Some(keyword) = hit {
            debug!("Anchor '{}' matched keyword '{}'", href, keyword);
            return Ok(Some(join_site_url(website, href)));
        }
    }
    Ok(None)
}

/// Absolute hrefs pass through, protocol-relative ones borrow the site's
/// scheme, anything else is appended to `root` with exactly one slash between.
pub fn join_site_url(root: &str, href: &str) -> String {
    if has_scheme(href) {
        return href.to_string();
    }
    if let Some(rest) = href.strip_prefix("//") {
        let scheme = Url::parse(root)
            .map(|u| u.scheme().to_string())
            .unwrap_or_else(|_| "https".to_string());
        return format!("{}://{}", scheme, rest);
    }
    format!("{}/{}", root.trim_end_matches('/'), href.trim_start_matches('/'))
}

fn has_scheme(href: &str) -> bool {
    match href.split_once(':') {
        Some((scheme, _)) => {
            let mut chars = scheme.chars();
            chars.next().map_or(false, |c| c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}
