use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::ConfigError;

const DEFAULT_SUBREDDITS: [&str; 8] = [
    "worldnews",
    "news",
    "europe",
    "politics",
    "upliftingnews",
    "truereddit",
    "inthenews",
    "nottheonion",
];

/// Full harvester configuration, as read from the YAML file and then
/// overridden from the environment.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub kafka: KafkaConfig,
    /// Extra HTTP headers sent with the feed-index request.
    pub rss_header: BTreeMap<String, String>,
    pub reddit: RedditConfig,
    pub twitter: TwitterConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Upper bound on concurrently in-flight fetches.
    pub max_workers: usize,
    /// Per-fetch timeout; an elapsed fetch counts as a request failure.
    pub request_timeout_secs: u64,
    pub log_dir: PathBuf,
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            max_workers: 20,
            request_timeout_secs: 5,
            log_dir: PathBuf::from("./logs"),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    pub host: String,
    pub port: u16,
    /// How long the producer may try to deliver one message.
    pub message_timeout_ms: u64,
    /// How long a flush may wait for outstanding acknowledgements.
    pub flush_timeout_ms: u64,
}

impl KafkaConfig {
    #[must_use]
    pub fn bootstrap_servers(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9092,
            message_timeout_ms: 10_000,
            flush_timeout_ms: 10_000,
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_agent: String,
    pub subreddits: Vec<String>,
}

impl RedditConfig {
    /// `(client_id, client_secret)`, required when harvesting Reddit.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredential`] naming the first absent value.
    pub fn credentials(&self) -> Result<(&str, &str), ConfigError> {
        let id = self
            .client_id
            .as_deref()
            .ok_or(ConfigError::MissingCredential("reddit.client_id"))?;
        let secret = self
            .client_secret
            .as_deref()
            .ok_or(ConfigError::MissingCredential("reddit.client_secret"))?;
        Ok((id, secret))
    }
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            user_agent: "oth-datapipeline".to_string(),
            subreddits: DEFAULT_SUBREDDITS.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct TwitterConfig {
    pub consumer_key: Option<String>,
    pub consumer_secret: Option<String>,
    pub bearer_token: Option<String>,
    /// Geographic scope of the trends that drive the live stream.
    pub trend_woeid: i64,
    pub trend_refresh_secs: u64,
    pub stream_retry: StreamRetryConfig,
}

/// How the filtered stream reacts to being disconnected with an error.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamRetryConfig {
    /// Reconnect attempts after an error; `0` ends the session on the first one.
    pub max_retries: u32,
    pub backoff_base_secs: u64,
}

impl Default for StreamRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_base_secs: 5,
        }
    }
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            consumer_key: None,
            consumer_secret: None,
            bearer_token: None,
            trend_woeid: 1,
            trend_refresh_secs: 30,
            stream_retry: StreamRetryConfig::default(),
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres URL for the job-run ledger; runs are only logged when unset.
    pub url: Option<String>,
    /// A run writes one row, so a small pool is plenty.
    pub max_connections: u32,
    /// How long to wait for a connection before the run falls back to
    /// log-only reporting.
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
            acquire_timeout_secs: 10,
        }
    }
}

fn redact(value: Option<&String>) -> Option<&'static str> {
    value.map(|_| "[redacted]")
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("general", &self.general)
            .field("kafka", &self.kafka)
            .field("rss_header", &self.rss_header.keys().collect::<Vec<_>>())
            .field("reddit", &self.reddit)
            .field("twitter", &self.twitter)
            .field("database", &self.database)
            .finish()
    }
}

impl std::fmt::Debug for RedditConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(self.client_secret.as_ref()))
            .field("user_agent", &self.user_agent)
            .field("subreddits", &self.subreddits)
            .finish()
    }
}

impl std::fmt::Debug for TwitterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitterConfig")
            .field("consumer_key", &redact(self.consumer_key.as_ref()))
            .field("consumer_secret", &redact(self.consumer_secret.as_ref()))
            .field("bearer_token", &redact(self.bearer_token.as_ref()))
            .field("trend_woeid", &self.trend_woeid)
            .field("trend_refresh_secs", &self.trend_refresh_secs)
            .field("stream_retry", &self.stream_retry)
            .finish()
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &redact(self.url.as_ref()))
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .finish()
    }
}
