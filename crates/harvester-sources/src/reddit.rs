//! Reddit collector (client-credentials OAuth): the day's top submissions of
//! a set of subreddits, each with its top comments.

use chrono::DateTime;
use harvester_core::{HarvestItem, Record};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::error::SourceError;
use crate::http::{build_client, ensure_success, read_json};
use crate::into_record;

const AUTH_BASE: &str = "https://www.reddit.com";
const API_BASE: &str = "https://oauth.reddit.com";
const TOP_LIMIT: u32 = 100;
const COMMENT_LIMIT: u32 = 10;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Listing<T> {
    data: ListingData<T>,
}

#[derive(Debug, Deserialize)]
struct ListingData<T> {
    children: Vec<Thing<T>>,
}

#[derive(Debug, Deserialize)]
struct Thing<T> {
    kind: String,
    data: T,
}

#[derive(Debug, Deserialize)]
struct SubmissionRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SubmissionData {
    id: String,
    title: String,
    #[serde(default)]
    selftext: String,
    created_utc: f64,
    score: i64,
    #[serde(default)]
    upvote_ratio: f64,
    #[serde(default)]
    domain: String,
}

/// Comment listings mix `t1` comments with `more` stubs, so every field is
/// optional here and only `t1` children are kept.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CommentData {
    body: Option<String>,
    created_utc: Option<f64>,
    score: Option<i64>,
}

#[derive(Debug, Serialize)]
struct CommentRecord {
    text: String,
    created: String,
    score: i64,
}

#[derive(Debug, Serialize)]
struct SubmissionRecord {
    id: String,
    title: String,
    selftext: String,
    created: String,
    score: i64,
    upvote_ratio: f64,
    domain: String,
    comments: Vec<CommentRecord>,
}

/// Reddit API client. The access token is exchanged on first use and reused
/// for the rest of the run.
pub struct RedditClient {
    client: Client,
    client_id: String,
    client_secret: String,
    user_agent: String,
    subreddits: Vec<String>,
    auth_base: String,
    api_base: String,
    token: OnceCell<String>,
}

impl RedditClient {
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn new(
        client_id: &str,
        client_secret: &str,
        user_agent: &str,
        subreddits: &[String],
        timeout_secs: u64,
    ) -> Result<Self, SourceError> {
        Self::with_base_urls(
            client_id,
            client_secret,
            user_agent,
            subreddits,
            timeout_secs,
            AUTH_BASE,
            API_BASE,
        )
    }

    /// Like [`RedditClient::new`] but against custom endpoints (used by tests).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn with_base_urls(
        client_id: &str,
        client_secret: &str,
        user_agent: &str,
        subreddits: &[String],
        timeout_secs: u64,
        auth_base: &str,
        api_base: &str,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            client: build_client(timeout_secs, user_agent)?,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            user_agent: user_agent.to_string(),
            subreddits: subreddits.to_vec(),
            auth_base: auth_base.trim_end_matches('/').to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token: OnceCell::new(),
        })
    }

    async fn token(&self) -> Result<&str, SourceError> {
        self.token
            .get_or_try_init(|| self.fetch_token())
            .await
            .map(String::as_str)
    }

    async fn fetch_token(&self) -> Result<String, SourceError> {
        let response = self
            .client
            .post(format!("{}/api/v1/access_token", self.auth_base))
            .header("User-Agent", &self.user_agent)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SourceError::Auth(format!(
                "Reddit token exchange failed with status {}",
                response.status()
            )));
        }

        let token: TokenResponse = read_json(response, "reddit token").await?;
        Ok(token.access_token)
    }

    /// Ids of today's top submissions across the configured subreddits.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if authentication or the listing request fails.
    pub async fn top_submissions(&self) -> Result<Vec<HarvestItem>, SourceError> {
        let token = self.token().await?;
        let url = format!("{}/r/{}/top", self.api_base, subreddit_query(&self.subreddits));
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[("t", "day".to_string()), ("limit", TOP_LIMIT.to_string())])
            .send()
            .await?;
        let listing: Listing<SubmissionRef> = read_json(response, "reddit top listing").await?;

        Ok(listing
            .data
            .children
            .into_iter()
            .filter(|thing| thing.kind == "t3")
            .map(|thing| HarvestItem::Submission(thing.data.id))
            .collect())
    }

    /// One submission with its top comments as a single record.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the request fails or the response does not
    /// have the expected `[submission, comments]` shape.
    pub async fn submission(&self, id: &str) -> Result<Record, SourceError> {
        let token = self.token().await?;
        let url = format!("{}/comments/{id}", self.api_base);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[
                ("sort", "top".to_string()),
                ("limit", COMMENT_LIMIT.to_string()),
                ("depth", "1".to_string()),
                ("raw_json", "1".to_string()),
            ])
            .send()
            .await?;
        let body = ensure_success(response)?.text().await?;
        parse_submission(&body)
    }
}

fn subreddit_query(subreddits: &[String]) -> String {
    if subreddits.is_empty() {
        "all".to_string()
    } else {
        subreddits.join("+")
    }
}

fn timestamp(epoch_secs: f64) -> String {
    #[allow(clippy::cast_possible_truncation)]
    DateTime::from_timestamp(epoch_secs as i64, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

fn parse_submission(body: &str) -> Result<Record, SourceError> {
    let (post, comments): (Listing<SubmissionData>, Listing<CommentData>) =
        serde_json::from_str(body).map_err(|e| SourceError::Deserialize {
            context: "reddit submission".to_string(),
            source: e,
        })?;

    let submission = post
        .data
        .children
        .into_iter()
        .next()
        .ok_or_else(|| SourceError::Api("submission listing is empty".to_string()))?
        .data;

    let comments = comments
        .data
        .children
        .into_iter()
        .filter(|thing| thing.kind == "t1")
        .take(COMMENT_LIMIT as usize)
        .filter_map(|thing| {
            let body = thing.data.body?;
            Some(CommentRecord {
                text: body,
                created: timestamp(thing.data.created_utc.unwrap_or_default()),
                score: thing.data.score.unwrap_or_default(),
            })
        })
        .collect();

    into_record(
        &SubmissionRecord {
            id: submission.id,
            title: submission.title,
            selftext: submission.selftext,
            created: timestamp(submission.created_utc),
            score: submission.score,
            upvote_ratio: submission.upvote_ratio,
            domain: submission.domain,
            comments,
        },
        "reddit submission record",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subreddit_query_joins_with_plus() {
        let subs = vec!["worldnews".to_string(), "europe".to_string()];
        assert_eq!(subreddit_query(&subs), "worldnews+europe");
        assert_eq!(subreddit_query(&[]), "all");
    }

    #[test]
    fn parse_submission_keeps_comments_and_drops_more_stubs() {
        let body = serde_json::json!([
            {"kind": "Listing", "data": {"children": [
                {"kind": "t3", "data": {
                    "id": "abc", "title": "Headline", "selftext": "",
                    "created_utc": 1_700_000_000.0, "score": 420,
                    "upvote_ratio": 0.93, "domain": "news.example"
                }}
            ]}},
            {"kind": "Listing", "data": {"children": [
                {"kind": "t1", "data": {"body": "first", "created_utc": 1_700_000_100.0, "score": 12}},
                {"kind": "t1", "data": {"body": "second", "created_utc": 1_700_000_200.0, "score": 3}},
                {"kind": "more", "data": {"count": 40, "children": ["x", "y"]}}
            ]}}
        ])
        .to_string();

        let record = parse_submission(&body).expect("should parse submission");
        assert_eq!(record["id"], "abc");
        assert_eq!(record["title"], "Headline");
        assert_eq!(record["score"], 420);
        assert_eq!(record["domain"], "news.example");
        assert_eq!(record["created"], "2023-11-14T22:13:20+00:00");
        let comments = record["comments"].as_array().unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0]["text"], "first");
        assert_eq!(comments[1]["score"], 3);
    }

    #[test]
    fn parse_submission_rejects_wrong_shape() {
        let result = parse_submission(r#"{"kind": "Listing"}"#);
        assert!(matches!(result, Err(SourceError::Deserialize { .. })));
    }
}
