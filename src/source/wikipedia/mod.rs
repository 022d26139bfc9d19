
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use super::{Document, DocumentSource};
use crate::config::WikipediaConfig;
use crate::http::{agent, request_with_retry};
use crate::{RagError, Result};

/// Client for the MediaWiki Action API returning plain-text page extracts
#[derive(Debug, Clone)]
pub struct WikipediaClient {
    api_url: Url,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    query: Option<QueryBody>,
}

#[derive(Debug, Default, Deserialize)]
struct QueryBody {
    #[serde(default)]
    pages: Vec<PageEntry>,
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct PageEntry {
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    extract: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

impl WikipediaClient {
    #[inline]
    pub fn new(config: &WikipediaConfig) -> Result<Self> {
        let api_url = Url::parse(&config.api_url)
            .with_context(|| format!("Invalid Wikipedia API URL: {}", config.api_url))?;

        Ok(Self {
            api_url,
            agent: agent(
                Duration::from_secs(config.timeout_seconds),
                Some(&config.user_agent),
            ),
            retry_attempts: config.retry_attempts,
        })
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Fetch a single page as a document. Blocking.
    #[inline]
    pub fn fetch_page(&self, title: &str, auto_suggest: bool) -> Result<Document> {
        let page_title = if auto_suggest {
            self.suggest_title(title)?
        } else {
            title.to_string()
        };

        let url = self.extract_url(&page_title);
        debug!("Fetching Wikipedia page '{}' from {}", page_title, url);

        let response_text = self
            .get(&url)
            .map_err(|e| source_error(title, format!("{e:#}")))?;
        let response: QueryResponse = serde_json::from_str(&response_text)
            .map_err(|e| source_error(title, format!("unexpected response: {e}")))?;

        let page = response
            .query
            .unwrap_or_default()
            .pages
            .into_iter()
            .next()
            .ok_or_else(|| source_error(title, "no page in response"))?;

        if page.missing || page.invalid {
            return Err(source_error(title, "page does not exist"));
        }

        let body = page.extract.unwrap_or_default();
        if body.trim().is_empty() {
            return Err(source_error(title, "page has no text"));
        }

        if page.title != title {
            info!("Resolved '{}' to Wikipedia page '{}'", title, page.title);
        }

        Ok(Document {
            title: title.to_string(),
            body,
        })
    }

    /// Resolve a title through the search API, falling back to the title itself
    fn suggest_title(&self, title: &str) -> Result<String> {
        let url = self.search_url(title);
        debug!("Searching Wikipedia for '{}'", title);

        let response_text = self
            .get(&url)
            .map_err(|e| source_error(title, format!("search failed: {e:#}")))?;
        let response: QueryResponse = serde_json::from_str(&response_text)
            .map_err(|e| source_error(title, format!("unexpected search response: {e}")))?;

        Ok(response
            .query
            .unwrap_or_default()
            .search
            .into_iter()
            .next()
            .map_or_else(|| title.to_string(), |hit| hit.title))
    }

    fn extract_url(&self, title: &str) -> Url {
        let mut url = self.api_url.clone();
        url.query_pairs_mut()
            .append_pair("action", "query")
            .append_pair("format", "json")
            .append_pair("formatversion", "2")
            .append_pair("prop", "extracts")
            .append_pair("explaintext", "1")
            .append_pair("redirects", "1")
            .append_pair("titles", title);
        url
    }

    fn search_url(&self, title: &str) -> Url {
        let mut url = self.api_url.clone();
        url.query_pairs_mut()
            .append_pair("action", "query")
            .append_pair("format", "json")
            .append_pair("formatversion", "2")
            .append_pair("list", "search")
            .append_pair("srlimit", "1")
            .append_pair("srsearch", title);
        url
    }

    fn get(&self, url: &Url) -> anyhow::Result<String> {
        request_with_retry(url.as_str(), self.retry_attempts, || {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }
}

fn source_error(title: &str, message: impl Into<String>) -> RagError {
    RagError::SourceFetch {
        title: title.to_string(),
        message: message.into(),
    }
}

#[async_trait]
impl DocumentSource for WikipediaClient {
    async fn fetch(&self, titles: &[String], suggest_alternate: bool) -> Result<Vec<Document>> {
        let client = self.clone();
        let titles = titles.to_vec();

        tokio::task::spawn_blocking(move || {
            titles
                .iter()
                .map(|title| client.fetch_page(title, suggest_alternate))
                .collect::<Result<Vec<_>>>()
        })
        .await
        .context("Wikipedia fetch task panicked")?
    }
}
