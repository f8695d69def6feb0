use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::FinderError;

pub const DEFAULT_CONFIG_FILE: &str = "report_finder";
pub const ENV_PREFIX: &str = "REPORT_FINDER";

pub const SERPAPI_ENDPOINT: &str = "https://serpapi.com/search.json";
pub const CSE_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

/// Which hosted search API resolves company websites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    #[default]
    #[serde(alias = "serp-api")]
    Serpapi,
    #[serde(alias = "cse", alias = "google")]
    GoogleCse,
}

impl ProviderKind {
    pub fn default_query_suffix(self) -> &'static str {
        match self {
            ProviderKind::Serpapi => "official website",
            ProviderKind::GoogleCse => "investor relations OR annual report",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "serpapi" | "serp-api" => Ok(ProviderKind::Serpapi),
            "google-cse" | "cse" | "google" => Ok(ProviderKind::GoogleCse),
            other => Err(format!(
                "unknown provider '{}', expected 'serpapi' or 'google-cse'",
                other
            )),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Serpapi => write!(f, "serpapi"),
            ProviderKind::GoogleCse => write!(f, "google-cse"),
        }
    }
}

/// Runtime settings for a batch. Credentials live here only in memory.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct FinderSettings {
    pub provider: ProviderKind,
    pub api_key: String,
    pub search_engine_id: Option<String>,
    pub query_suffix: Option<String>,
    pub serpapi_endpoint: String,
    pub cse_endpoint: String,
    pub delay_ms: u64,
    pub delay_jitter_ms: u64,
    pub fetch_timeout_secs: u64,
    pub search_timeout_secs: u64,
    pub user_agent: String,
    /// Header of the column holding company names. `None` reads the first
    /// column of a headerless file.
    pub company_column: Option<String>,
}

impl Default for FinderSettings {
    fn default() -> Self {
        FinderSettings {
            provider: ProviderKind::default(),
            api_key: String::new(),
            search_engine_id: None,
            query_suffix: None,
            serpapi_endpoint: SERPAPI_ENDPOINT.to_string(),
            cse_endpoint: CSE_ENDPOINT.to_string(),
            delay_ms: 1000,
            delay_jitter_ms: 0,
            fetch_timeout_secs: 10,
            search_timeout_secs: 30,
            user_agent: "Mozilla/5.0".to_string(),
            company_column: None,
        }
    }
}

// Keeps the API key out of logs.
impl fmt::Debug for FinderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinderSettings")
            .field("provider", &self.provider)
            .field("api_key", &redact(&self.api_key))
            .field("search_engine_id", &self.search_engine_id)
            .field("query_suffix", &self.query_suffix)
            .field("serpapi_endpoint", &self.serpapi_endpoint)
            .field("cse_endpoint", &self.cse_endpoint)
            .field("delay_ms", &self.delay_ms)
            .field("delay_jitter_ms", &self.delay_jitter_ms)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("search_timeout_secs", &self.search_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("company_column", &self.company_column)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl FinderSettings {
    /// Layers defaults, an optional config file and `REPORT_FINDER_*`
    /// environment variables.
    ///
    /// With `path == None` the file `report_finder.{toml,json,yaml}` is read
    /// from the working directory when present.
    pub fn load(path: Option<&Path>) -> Result<Self, FinderError> {
        Self::load_with_env(path, config::Environment::with_prefix(ENV_PREFIX))
    }

    // Environment values stay strings until serde asks for a number, so keys
    // and engine ids such as "0123" keep their leading zeros.
    fn load_with_env(path: Option<&Path>, env: config::Environment) -> Result<Self, FinderError> {
        let file = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(env)
            .build()?
            .try_deserialize::<FinderSettings>()?;

        log::debug!("Loaded settings: {:?}", settings);
        Ok(settings)
    }

    /// Refuses to start a batch without the credentials the provider needs.
    pub fn validate(&self) -> Result<(), FinderError> {
        if self.api_key.trim().is_empty() {
            return Err(FinderError::MissingCredential("API key"));
        }
        if self.provider == ProviderKind::GoogleCse
            && self
                .search_engine_id
                .as_deref()
                .map_or(true, |cx| cx.trim().is_empty())
        {
            return Err(FinderError::MissingCredential("search engine id (cx)"));
        }
        Ok(())
    }

    pub fn query_suffix(&self) -> &str {
        self.query_suffix
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.provider.default_query_suffix())
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn delay_jitter(&self) -> Duration {
        Duration::from_millis(self.delay_jitter_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }
}
