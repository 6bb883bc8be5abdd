//! Twitter collector: trending topics for a handful of locations, and a
//! recent-search per topic.

use std::collections::HashSet;

use async_trait::async_trait;
use harvester_core::{HarvestItem, Record, TrendSource, TwitterConfig};
use percent_encoding::percent_decode_str;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::error::SourceError;
use crate::http::{build_client, read_json, DEFAULT_USER_AGENT};
use crate::into_record;

pub(crate) const API_BASE: &str = "https://api.twitter.com";

const WORLDWIDE_WOEID: i64 = 1;
const GERMANY_WOEID: i64 = 23_424_829;
const HOME_LAT: f64 = 49.1;
const HOME_LONG: f64 = 12.6;
const SEARCH_SUFFIX: &str = " -is:retweet -is:reply is:verified (lang:en OR lang:de)";
const SEARCH_MAX_RESULTS: u32 = 100;

/// App-only authentication. Holds a configured bearer token, or exchanges
/// the consumer key and secret for one on first use.
#[derive(Clone)]
pub struct TwitterAuth {
    bearer: OnceCell<String>,
    consumer: Option<(String, String)>,
}

impl std::fmt::Debug for TwitterAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitterAuth")
            .field("bearer", &self.bearer.initialized().then_some("[redacted]"))
            .field("consumer", &self.consumer.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token_type: String,
    access_token: String,
}

impl TwitterAuth {
    #[must_use]
    pub fn bearer(token: &str) -> Self {
        Self {
            bearer: OnceCell::new_with(Some(token.to_string())),
            consumer: None,
        }
    }

    #[must_use]
    pub fn consumer(key: &str, secret: &str) -> Self {
        Self {
            bearer: OnceCell::new(),
            consumer: Some((key.to_string(), secret.to_string())),
        }
    }

    /// Prefer the configured bearer token; fall back to consumer credentials.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Config`] if neither is configured.
    pub fn from_config(config: &TwitterConfig) -> Result<Self, SourceError> {
        if let Some(token) = config.bearer_token.as_deref() {
            return Ok(Self::bearer(token));
        }
        match (
            config.consumer_key.as_deref(),
            config.consumer_secret.as_deref(),
        ) {
            (Some(key), Some(secret)) => Ok(Self::consumer(key, secret)),
            _ => Err(SourceError::Config(
                "twitter needs a bearer token or consumer key and secret".to_string(),
            )),
        }
    }

    pub(crate) async fn token(&self, client: &Client, api_base: &str) -> Result<&str, SourceError> {
        self.bearer
            .get_or_try_init(|| self.exchange(client, api_base))
            .await
            .map(String::as_str)
    }

    async fn exchange(&self, client: &Client, api_base: &str) -> Result<String, SourceError> {
        let Some((key, secret)) = &self.consumer else {
            return Err(SourceError::Auth("no twitter credentials".to_string()));
        };

        let response = client
            .post(format!("{api_base}/oauth2/token"))
            .basic_auth(key, Some(secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SourceError::Auth(format!(
                "Twitter token exchange failed with status {}",
                response.status()
            )));
        }

        let token: TokenResponse = read_json(response, "twitter token").await?;
        if !token.token_type.eq_ignore_ascii_case("bearer") {
            return Err(SourceError::Auth(format!(
                "unexpected token type {:?}",
                token.token_type
            )));
        }
        Ok(token.access_token)
    }
}

// Wire types shared with the filtered stream.

#[derive(Debug, Deserialize)]
pub(crate) struct Tweet {
    pub(crate) id: String,
    pub(crate) text: String,
    #[serde(default)]
    pub(crate) created_at: Option<String>,
    #[serde(default)]
    pub(crate) lang: Option<String>,
    #[serde(default)]
    pub(crate) author_id: Option<String>,
    #[serde(default)]
    pub(crate) geo: Option<Geo>,
    #[serde(default)]
    pub(crate) public_metrics: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Geo {
    pub(crate) place_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Includes {
    pub(crate) places: Vec<Place>,
    pub(crate) users: Vec<User>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Place {
    pub(crate) id: String,
    pub(crate) full_name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) username: String,
    #[serde(default)]
    pub(crate) verified: bool,
    #[serde(default)]
    pub(crate) public_metrics: Option<UserMetrics>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserMetrics {
    #[serde(default)]
    pub(crate) followers_count: u64,
}

impl Includes {
    /// Full name of the place a tweet is geotagged with, if it was expanded.
    pub(crate) fn place_name(&self, tweet: &Tweet) -> Option<&str> {
        let place_id = tweet.geo.as_ref()?.place_id.as_deref()?;
        self.places
            .iter()
            .find(|place| place.id == place_id)
            .map(|place| place.full_name.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Tweet>,
    #[serde(default)]
    includes: Includes,
}

#[derive(Debug, Deserialize)]
struct Location {
    woeid: i64,
}

#[derive(Debug, Deserialize)]
struct PlaceTrends {
    trends: Vec<Trend>,
}

#[derive(Debug, Deserialize)]
struct Trend {
    name: String,
    query: String,
}

#[derive(Debug, Serialize)]
struct SearchRecord<'a> {
    tweet_id: &'a str,
    text: &'a str,
    created_at: &'a str,
    lang: &'a str,
    place: &'a str,
}

/// Twitter REST client for trends and recent search.
pub struct TwitterClient {
    client: Client,
    api_base: String,
    auth: TwitterAuth,
}

impl TwitterClient {
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn new(auth: TwitterAuth, timeout_secs: u64) -> Result<Self, SourceError> {
        Self::with_base_url(auth, timeout_secs, API_BASE)
    }

    /// Like [`TwitterClient::new`] but against a custom API root (used by tests).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn with_base_url(
        auth: TwitterAuth,
        timeout_secs: u64,
        api_base: &str,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            client: build_client(timeout_secs, DEFAULT_USER_AGENT)?,
            api_base: api_base.trim_end_matches('/').to_string(),
            auth,
        })
    }

    /// Locations whose trends are collected: worldwide, Germany, and every
    /// location the API considers closest to the home coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the closest-locations lookup fails.
    pub async fn trending_locations(&self) -> Result<Vec<i64>, SourceError> {
        let token = self.auth.token(&self.client, &self.api_base).await?;
        let response = self
            .client
            .get(format!("{}/1.1/trends/closest.json", self.api_base))
            .bearer_auth(token)
            .query(&[("lat", HOME_LAT), ("long", HOME_LONG)])
            .send()
            .await?;
        let closest: Vec<Location> = read_json(response, "twitter closest trends").await?;

        let mut locations = vec![WORLDWIDE_WOEID, GERMANY_WOEID];
        for location in closest {
            if !locations.contains(&location.woeid) {
                locations.push(location.woeid);
            }
        }
        Ok(locations)
    }

    async fn place_trends(
        &self,
        woeid: i64,
        exclude_hashtags: bool,
    ) -> Result<Vec<Trend>, SourceError> {
        let token = self.auth.token(&self.client, &self.api_base).await?;
        let mut request = self
            .client
            .get(format!("{}/1.1/trends/place.json", self.api_base))
            .bearer_auth(token)
            .query(&[("id", woeid)]);
        if exclude_hashtags {
            request = request.query(&[("exclude", "hashtags")]);
        }
        let places: Vec<PlaceTrends> = read_json(request.send().await?, "twitter place trends").await?;

        Ok(places
            .into_iter()
            .next()
            .map(|place| place.trends)
            .unwrap_or_default())
    }

    /// Unique search queries of the current non-hashtag trends across all
    /// trending locations.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if any of the trend lookups fails.
    pub async fn trend_queries(&self) -> Result<Vec<HarvestItem>, SourceError> {
        let mut seen = HashSet::new();
        let mut queries = Vec::new();
        for woeid in self.trending_locations().await? {
            for trend in self.place_trends(woeid, true).await? {
                let query = percent_decode_str(&trend.query)
                    .decode_utf8_lossy()
                    .into_owned();
                if seen.insert(query.clone()) {
                    queries.push(HarvestItem::Query(query));
                }
            }
        }
        tracing::debug!(queries = queries.len(), "collected trend queries");
        Ok(queries)
    }

    /// Recent verified English or German original tweets for a query, one
    /// record per tweet.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the search request fails.
    pub async fn search(&self, query: &str) -> Result<Vec<Record>, SourceError> {
        let token = self.auth.token(&self.client, &self.api_base).await?;
        let response = self
            .client
            .get(format!("{}/2/tweets/search/recent", self.api_base))
            .bearer_auth(token)
            .query(&[
                ("query", format!("{query}{SEARCH_SUFFIX}")),
                ("tweet.fields", "text,created_at,lang,geo".to_string()),
                ("expansions", "geo.place_id".to_string()),
                ("max_results", SEARCH_MAX_RESULTS.to_string()),
            ])
            .send()
            .await?;
        let body: SearchResponse = read_json(response, "twitter recent search").await?;
        search_records(&body)
    }
}

fn search_records(body: &SearchResponse) -> Result<Vec<Record>, SourceError> {
    body.data
        .iter()
        .map(|tweet| {
            into_record(
                &SearchRecord {
                    tweet_id: &tweet.id,
                    text: &tweet.text,
                    created_at: tweet.created_at.as_deref().unwrap_or_default(),
                    lang: tweet.lang.as_deref().unwrap_or_default(),
                    place: body.includes.place_name(tweet).unwrap_or_default(),
                },
                "twitter search record",
            )
        })
        .collect()
}

#[async_trait]
impl TrendSource for TwitterClient {
    type Error = SourceError;

    async fn current_trends(&self, woeid: i64) -> Result<Vec<String>, SourceError> {
        let trends = self.place_trends(woeid, false).await?;
        let mut seen = HashSet::new();
        Ok(trends
            .into_iter()
            .map(|trend| trend.name)
            .filter(|name| seen.insert(name.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_records_resolve_places() {
        let body: SearchResponse = serde_json::from_value(serde_json::json!({
            "data": [
                {"id": "1", "text": "hello", "created_at": "2024-03-09T10:00:00.000Z",
                 "lang": "en", "geo": {"place_id": "p1"}},
                {"id": "2", "text": "hallo", "created_at": "2024-03-09T10:01:00.000Z",
                 "lang": "de"}
            ],
            "includes": {"places": [{"id": "p1", "full_name": "Regensburg, Germany"}]}
        }))
        .unwrap();

        let records = search_records(&body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["tweet_id"], "1");
        assert_eq!(records[0]["place"], "Regensburg, Germany");
        assert_eq!(records[1]["lang"], "de");
        assert_eq!(records[1]["place"], "");
    }

    #[test]
    fn empty_search_yields_no_records() {
        let body: SearchResponse =
            serde_json::from_value(serde_json::json!({"meta": {"result_count": 0}})).unwrap();
        assert!(search_records(&body).unwrap().is_empty());
    }

    #[test]
    fn auth_from_config_prefers_bearer() {
        let config = TwitterConfig {
            bearer_token: Some("bearer".into()),
            consumer_key: Some("key".into()),
            consumer_secret: Some("secret".into()),
            ..TwitterConfig::default()
        };
        let auth = TwitterAuth::from_config(&config).unwrap();
        assert_eq!(auth.bearer.get().map(String::as_str), Some("bearer"));
    }

    #[test]
    fn auth_from_config_without_credentials_fails() {
        let result = TwitterAuth::from_config(&TwitterConfig::default());
        assert!(matches!(result, Err(SourceError::Config(_))));
    }

    #[test]
    fn auth_debug_hides_token() {
        let rendered = format!("{:?}", TwitterAuth::bearer("top-secret"));
        assert!(!rendered.contains("top-secret"));
    }
}
