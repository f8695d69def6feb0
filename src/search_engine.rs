use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::Deserialize;
use log::{info, warn, debug};
use url::Url;

use crate::error::{FinderError, SearchError};
use crate::settings::{FinderSettings, ProviderKind};

/// Top organic hit for a company query. Only lives inside a resolver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub link: String,
    pub domain: Option<String>,
}

impl SearchResult {
    pub fn new(link: String, display_domain: Option<String>) -> Self {
        let domain = display_domain
            .filter(|d| !d.trim().is_empty())
            .map(|d| d.trim_start_matches("www.").to_string())
            .or_else(|| domain_of(&link));
        SearchResult { link, domain }
    }
}

/// Host of `link` without a leading `www.`.
pub fn domain_of(link: &str) -> Option<String> {
    Url::parse(link)
        .ok()?
        .host_str()
        .map(|h| h.trim_start_matches("www.").to_string())
}

pub trait SearchProvider {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when the provider has no organic result for the company.
    fn top_result(&self, company: &str) -> Result<Option<SearchResult>, SearchError>;
}

pub fn build_provider(settings: &FinderSettings) -> Result<Box<dyn SearchProvider>, FinderError> {
    settings.validate()?;
    let client = search_client(settings)?;
    let suffix = settings.query_suffix().to_string();

    let provider: Box<dyn SearchProvider> = match settings.provider {
        ProviderKind::Serpapi => Box::new(SerpApiSearch {
            client,
            endpoint: settings.serpapi_endpoint.clone(),
            api_key: settings.api_key.clone(),
            query_suffix: suffix,
        }),
        ProviderKind::GoogleCse => Box::new(GoogleCustomSearch {
            client,
            endpoint: settings.cse_endpoint.clone(),
            api_key: settings.api_key.clone(),
            search_engine_id: settings.search_engine_id.clone().unwrap_or_default(),
            query_suffix: suffix,
        }),
    };
    info!("Using search provider: {}", provider.name());
    Ok(provider)
}

fn search_client(settings: &FinderSettings) -> Result<Client, FinderError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    let client = Client::builder()
        .timeout(settings.search_timeout())
        .default_headers(headers)
        .build()?;
    Ok(client)
}

fn build_query(company: &str, suffix: &str) -> String {
    format!("{} {}", company.trim(), suffix)
}

/// Reads the body of a provider response, turning non-2xx answers into
/// `SearchError::Status` with whatever message the provider sent back.
fn read_body(resp: reqwest::blocking::Response) -> Result<String, SearchError> {
    let status = resp.status();
    let text = resp.text()?;
    if !status.is_success() {
        let message = provider_error_message(&text).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string()
        });
        warn!("Search failed with status: {}", status);
        return Err(SearchError::Status {
            status: status.as_u16(),
            message,
        });
    }
    Ok(text)
}

// SerpApi puts `error` at the top level as a string, Google nests
// `error.message`.
fn provider_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    error
        .as_str()
        .or_else(|| error.get("message").and_then(|m| m.as_str()))
        .map(str::to_string)
}

/// Hosted Google-results API keyed by a single API key.
pub struct SerpApiSearch {
    client: Client,
    endpoint: String,
    api_key: String,
    query_suffix: String,
}

#[derive(Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    organic_results: Vec<SerpApiOrganic>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct SerpApiOrganic {
    link: Option<String>,
}

impl SearchProvider for SerpApiSearch {
    fn name(&self) -> &'static str {
        "serpapi"
    }

    fn top_result(&self, company: &str) -> Result<Option<SearchResult>, SearchError> {
        let query = build_query(company, &self.query_suffix);
        let url = format!(
            "{}?engine=google&q={}&api_key={}&num=1",
            self.endpoint,
            urlencoding::encode(&query),
            urlencoding::encode(&self.api_key)
        );
        info!("Searching for: '{}'", query);

        let text = read_body(self.client.get(&url).send()?)?;
        let parsed: SerpApiResponse = serde_json::from_str(&text)?;

        if let Some(link) = parsed.organic_results.into_iter().find_map(|r| r.link) {
            return Ok(Some(SearchResult::new(link, None)));
        }
        match parsed.error {
            // Reported when Google simply has nothing for the query.
            Some(e) if e.contains("hasn't returned any results") => {
                debug!("SerpApi: {}", e);
                Ok(None)
            }
            Some(e) => Err(SearchError::Provider(e)),
            None => Ok(None),
        }
    }
}

/// Google Custom Search JSON API, keyed by an API key and a search engine id.
pub struct GoogleCustomSearch {
    client: Client,
    endpoint: String,
    api_key: String,
    search_engine_id: String,
    query_suffix: String,
}

#[derive(Deserialize)]
struct CseResponse {
    #[serde(default)]
    items: Vec<CseItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CseItem {
    link: Option<String>,
    display_link: Option<String>,
}

impl SearchProvider for GoogleCustomSearch {
    fn name(&self) -> &'static str {
        "google-cse"
    }

    fn top_result(&self, company: &str) -> Result<Option<SearchResult>, SearchError> {
        let query = build_query(company, &self.query_suffix);
        let url = format!(
            "{}?key={}&cx={}&q={}&num=1",
            self.endpoint,
            urlencoding::encode(&self.api_key),
            urlencoding::encode(&self.search_engine_id),
            urlencoding::encode(&query)
        );
        info!("Searching for: '{}'", query);

        let text = read_body(self.client.get(&url).send()?)?;
        let parsed: CseResponse = serde_json::from_str(&text)?;

        Ok(parsed.items.into_iter().find_map(|item| {
            let display = item.display_link;
            item.link.map(|link| SearchResult::new(link, display))
        }))
    }
}
