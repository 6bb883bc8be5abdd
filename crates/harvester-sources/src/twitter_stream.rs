//! Filtered-stream subscription: rule management and the long-lived
//! newline-delimited JSON connection.

use async_trait::async_trait;
use futures::StreamExt;
use harvester_core::{FilterRule, NewRule, Record, RuleStore, StreamEvent, StreamTransport};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SourceError;
use crate::http::{build_client, build_streaming_client, ensure_success, read_json, DEFAULT_USER_AGENT};
use crate::into_record;
use crate::twitter::{Includes, Tweet, TwitterAuth, API_BASE};

const TWEET_FIELDS: &str = "text,created_at,lang,public_metrics,geo";
const USER_FIELDS: &str = "username,verified,public_metrics";
const EXPANSIONS: &str = "author_id,geo.place_id";

#[derive(Debug, Deserialize)]
struct RulesResponse {
    #[serde(default)]
    data: Vec<FilterRule>,
    #[serde(default)]
    errors: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct AddRulesRequest<'a> {
    add: &'a [NewRule],
}

#[derive(Debug, Serialize)]
struct DeleteRulesRequest<'a> {
    delete: DeleteIds<'a>,
}

#[derive(Debug, Serialize)]
struct DeleteIds<'a> {
    ids: &'a [String],
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    data: Option<Tweet>,
    #[serde(default)]
    includes: Includes,
    #[serde(default)]
    matching_rules: Vec<MatchingRule>,
    #[serde(default)]
    errors: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct MatchingRule {
    #[serde(default)]
    tag: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct Author<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_followers: Option<u64>,
}

#[derive(Debug, Serialize)]
struct StreamRecord<'a> {
    tweet_id: &'a str,
    text: &'a str,
    created_at: &'a str,
    metrics: &'a Value,
    author: Author<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    place: Option<&'a str>,
    trend: Option<&'a str>,
}

/// What one line of the stream turned out to be.
#[derive(Debug)]
pub(crate) enum StreamLine {
    Event(StreamEvent),
    /// Server-side error report with no tweet attached; ends the connection.
    Errors(Vec<Value>),
    Skip,
}

/// Client for the filtered stream and its rule set.
pub struct TwitterStream {
    client: Client,
    stream_client: Client,
    api_base: String,
    auth: TwitterAuth,
}

impl TwitterStream {
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP clients cannot be built.
    pub fn new(auth: TwitterAuth, timeout_secs: u64) -> Result<Self, SourceError> {
        Self::with_base_url(auth, timeout_secs, API_BASE)
    }

    /// Like [`TwitterStream::new`] but against a custom API root (used by tests).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP clients cannot be built.
    pub fn with_base_url(
        auth: TwitterAuth,
        timeout_secs: u64,
        api_base: &str,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            client: build_client(timeout_secs, DEFAULT_USER_AGENT)?,
            stream_client: build_streaming_client(timeout_secs, DEFAULT_USER_AGENT)?,
            api_base: api_base.trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn rules_url(&self) -> String {
        format!("{}/2/tweets/search/stream/rules", self.api_base)
    }

    async fn post_rules<T: Serialize + Sync>(&self, body: &T) -> Result<RulesResponse, SourceError> {
        let token = self.auth.token(&self.client, &self.api_base).await?;
        let response = self
            .client
            .post(self.rules_url())
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        let rules: RulesResponse = read_json(response, "twitter stream rules").await?;
        for error in &rules.errors {
            tracing::warn!(%error, "stream rule update reported an error");
        }
        Ok(rules)
    }
}

#[async_trait]
impl RuleStore for TwitterStream {
    type Error = SourceError;

    async fn list_rules(&self) -> Result<Vec<FilterRule>, SourceError> {
        let token = self.auth.token(&self.client, &self.api_base).await?;
        let response = self
            .client
            .get(self.rules_url())
            .bearer_auth(token)
            .send()
            .await?;
        let rules: RulesResponse = read_json(response, "twitter stream rules").await?;
        Ok(rules.data)
    }

    async fn delete_rules(&self, ids: &[String]) -> Result<(), SourceError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.post_rules(&DeleteRulesRequest {
            delete: DeleteIds { ids },
        })
        .await?;
        Ok(())
    }

    async fn add_rules(&self, rules: &[NewRule]) -> Result<Vec<FilterRule>, SourceError> {
        if rules.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.post_rules(&AddRulesRequest { add: rules }).await?.data)
    }
}

#[async_trait]
impl StreamTransport for TwitterStream {
    type Error = SourceError;

    async fn run(
        &self,
        events: mpsc::Sender<StreamEvent>,
        shutdown: CancellationToken,
    ) -> Result<(), SourceError> {
        let token = self.auth.token(&self.client, &self.api_base).await?;
        let response = self
            .stream_client
            .get(format!("{}/2/tweets/search/stream", self.api_base))
            .bearer_auth(token)
            .query(&[
                ("tweet.fields", TWEET_FIELDS),
                ("user.fields", USER_FIELDS),
                ("expansions", EXPANSIONS),
            ])
            .send()
            .await?;
        let mut body = ensure_success(response)?.bytes_stream();
        tracing::info!("connected to filtered stream");

        let mut buffer: Vec<u8> = Vec::new();
        loop {
            let chunk = tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                chunk = body.next() => chunk,
            };
            let Some(chunk) = chunk else {
                return Err(SourceError::Stream("connection closed by server".to_string()));
            };
            buffer.extend_from_slice(&chunk?);

            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                match parse_line(&line) {
                    StreamLine::Event(event) => {
                        if events.send(event).await.is_err() {
                            tracing::debug!("stream consumer gone; closing connection");
                            return Ok(());
                        }
                    }
                    StreamLine::Errors(errors) => {
                        for error in &errors {
                            tracing::error!(%error, "filtered stream reported an error");
                        }
                        return Err(SourceError::Stream(format!(
                            "stream reported {} error(s)",
                            errors.len()
                        )));
                    }
                    StreamLine::Skip => {}
                }
            }
        }
    }
}

/// Decode one line of the stream. Blank keep-alive lines and lines that do
/// not parse are skipped.
pub(crate) fn parse_line(line: &[u8]) -> StreamLine {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return StreamLine::Skip;
    }

    let message: StreamMessage = match serde_json::from_slice(trimmed) {
        Ok(message) => message,
        Err(error) => {
            tracing::warn!(%error, "skipping undecodable stream line");
            return StreamLine::Skip;
        }
    };

    let Some(tweet) = message.data.as_ref() else {
        if message.errors.is_empty() {
            return StreamLine::Skip;
        }
        return StreamLine::Errors(message.errors);
    };

    match process_tweet(tweet, &message.includes, &message.matching_rules) {
        Ok(event) => StreamLine::Event(event),
        Err(error) => {
            tracing::warn!(%error, tweet_id = %tweet.id, "skipping tweet");
            StreamLine::Skip
        }
    }
}

fn process_tweet(
    tweet: &Tweet,
    includes: &Includes,
    rules: &[MatchingRule],
) -> Result<StreamEvent, SourceError> {
    let author = tweet
        .author_id
        .as_deref()
        .and_then(|author_id| includes.users.iter().find(|user| user.id == author_id))
        .map(|user| Author {
            username: Some(&user.username),
            verified: Some(user.verified),
            num_followers: user.public_metrics.as_ref().map(|m| m.followers_count),
        })
        .unwrap_or_default();
    let tag = rules.first().and_then(|rule| rule.tag.as_deref());

    let record: Record = into_record(
        &StreamRecord {
            tweet_id: &tweet.id,
            text: &tweet.text,
            created_at: tweet.created_at.as_deref().unwrap_or_default(),
            metrics: tweet.public_metrics.as_ref().unwrap_or(&Value::Null),
            author,
            place: includes.place_name(tweet),
            trend: tag,
        },
        "twitter stream record",
    )?;

    Ok(StreamEvent {
        record,
        tag: tag.map(str::to_string),
    })
}
