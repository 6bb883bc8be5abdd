//! Feed-index collector: scrapes a page listing RSS feeds, then fetches each
//! feed document as-is.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;

use crate::error::SourceError;
use crate::http::{build_client, ensure_success, DEFAULT_USER_AGENT};

static FEED_ENTRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<a class="ext" .*?>.*?</a>"#).expect("valid feed entry regex"));
static FEED_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href="(http.+?)""#).expect("valid feed url regex"));

/// HTTP client for a feed-index page and the feeds it links to.
pub struct FeedIndexClient {
    client: Client,
    base_url: String,
    headers: HeaderMap,
}

impl FeedIndexClient {
    /// Creates a client for the index at `base_url`.
    ///
    /// `headers` are sent with the index request only; index sites tend to
    /// reject clients that do not look like a browser, the feeds themselves
    /// do not.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Config`] if a header name or value is invalid,
    /// or [`SourceError::Http`] if the client cannot be built.
    pub fn new(
        base_url: &str,
        headers: &BTreeMap<String, String>,
        timeout_secs: u64,
    ) -> Result<Self, SourceError> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SourceError::Config(format!("header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| SourceError::Config(format!("header value for {name}: {e}")))?;
            header_map.insert(name, value);
        }

        Ok(Self {
            client: build_client(timeout_secs, DEFAULT_USER_AGENT)?,
            base_url: base_url.to_string(),
            headers: header_map,
        })
    }

    /// Fetch the index page and return every feed URL it links to.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the index page cannot be fetched.
    pub async fn feed_urls(&self) -> Result<Vec<String>, SourceError> {
        let response = self
            .client
            .get(&self.base_url)
            .headers(self.headers.clone())
            .send()
            .await?;
        let html = ensure_success(response)?.text().await?;
        let urls = extract_feed_urls(&html);
        tracing::debug!(index = %self.base_url, feeds = urls.len(), "extracted feed urls");
        Ok(urls)
    }

    /// Fetch one raw feed document.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on network failure, timeout, or a non-2xx status.
    pub async fn fetch_feed(&self, url: &str) -> Result<String, SourceError> {
        let response = self.client.get(url).send().await?;
        Ok(ensure_success(response)?.text().await?)
    }
}

/// Pull feed URLs out of the index page markup.
///
/// Each `<a class="ext" ...>` anchor contributes its first absolute `href`;
/// anchors without one are skipped.
pub(crate) fn extract_feed_urls(html: &str) -> Vec<String> {
    FEED_ENTRY_RE
        .find_iter(html)
        .filter_map(|entry| {
            FEED_URL_RE
                .captures(entry.as_str())
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        })
        .collect()
}
