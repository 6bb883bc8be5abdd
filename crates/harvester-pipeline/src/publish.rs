//! Splitting payloads into broker messages and handing them to the broker.

use chrono::{DateTime, Datelike, Timelike, Utc};
use harvester_core::{Payload, Record, RSS_TOPIC, TWITTER_STREAM_TOPIC, TWITTER_TOPIC};
use serde_json::Value;
use uuid::Uuid;

use crate::broker::Broker;
use crate::error::PublishError;

/// How payloads on a topic are split into messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicFamily {
    /// Raw feed documents, one message per entry.
    Feed,
    /// Live stream events, one message per record.
    SocialStream,
    /// Search results, one message per record.
    SocialSearch,
    /// Everything else: the payload is one message.
    Opaque,
}

impl TopicFamily {
    #[must_use]
    pub fn for_topic(topic: &str) -> Self {
        match topic {
            RSS_TOPIC => TopicFamily::Feed,
            TWITTER_STREAM_TOPIC => TopicFamily::SocialStream,
            TWITTER_TOPIC => TopicFamily::SocialSearch,
            _ => TopicFamily::Opaque,
        }
    }
}

/// One broker message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishUnit {
    pub topic: String,
    pub key: Uuid,
    pub body: Vec<u8>,
}

impl PublishUnit {
    fn new(topic: &str, body: Vec<u8>) -> Self {
        Self {
            topic: topic.to_string(),
            key: Uuid::new_v4(),
            body,
        }
    }

    fn record(topic: &str, record: &Record) -> Result<Self, PublishError> {
        Ok(Self::new(topic, serde_json::to_vec(record)?))
    }
}

fn payload_kind(payload: &Payload) -> &'static str {
    match payload {
        Payload::Text(_) => "text",
        Payload::Record(_) => "record",
        Payload::Records(_) => "record list",
    }
}

/// Split a payload into messages according to the topic's family. Every unit
/// gets a fresh key.
///
/// # Errors
///
/// Returns [`PublishError::Feed`] if a feed document does not parse, and
/// [`PublishError::PayloadShape`] if a feed topic receives structured data.
pub fn decompose(topic: &str, payload: &Payload) -> Result<Vec<PublishUnit>, PublishError> {
    match (TopicFamily::for_topic(topic), payload) {
        (TopicFamily::Feed, Payload::Text(document)) => feed_units(topic, document),
        (TopicFamily::Feed, _) => Err(PublishError::PayloadShape {
            topic: topic.to_string(),
            payload: payload_kind(payload),
        }),
        (TopicFamily::SocialStream | TopicFamily::SocialSearch, Payload::Records(records)) => {
            records
                .iter()
                .map(|record| PublishUnit::record(topic, record))
                .collect()
        }
        (_, Payload::Record(record)) => Ok(vec![PublishUnit::record(topic, record)?]),
        (_, Payload::Text(text)) => Ok(vec![PublishUnit::new(topic, text.clone().into_bytes())]),
        (TopicFamily::Opaque, Payload::Records(records)) => {
            Ok(vec![PublishUnit::new(topic, serde_json::to_vec(records)?)])
        }
    }
}

/// One message per feed entry, each tagged with the feed's title as
/// `feed_source`.
///
/// The entry shape is the classic feed-reader one: `*_detail` objects next to
/// the plain `title` and `summary`, `guidislink`, and the `*_parsed` dates as
/// nine-field UTC time tuples.
fn feed_units(topic: &str, document: &str) -> Result<Vec<PublishUnit>, PublishError> {
    let feed = feed_rs::parser::parse(document.as_bytes()).map_err(|e| PublishError::Feed {
        topic: topic.to_string(),
        reason: e.to_string(),
    })?;
    let feed_source = feed.title.map(|t| t.content).unwrap_or_default();
    let language = feed.language;

    feed.entries
        .into_iter()
        .map(|entry| {
            let link = entry.links.first().map(|l| l.href.clone());
            let body = serde_json::json!({
                "id": entry.id,
                "guidislink": link.as_deref() == Some(entry.id.as_str()),
                "title": entry.title.as_ref().map(|t| t.content.as_str()),
                "title_detail": entry.title.as_ref().map(|t| text_detail(t, language.as_deref())),
                "link": link,
                "links": entry
                    .links
                    .iter()
                    .map(|l| serde_json::json!({
                        "href": l.href,
                        "rel": l.rel.as_deref().unwrap_or("alternate"),
                        "type": l.media_type,
                    }))
                    .collect::<Vec<_>>(),
                "summary": entry.summary.as_ref().map(|t| t.content.as_str()),
                "summary_detail": entry.summary.as_ref().map(|t| text_detail(t, language.as_deref())),
                "content": entry.content.and_then(|c| c.body),
                "published": entry.published.map(|dt| dt.to_rfc3339()),
                "published_parsed": entry.published.map(time_tuple),
                "updated": entry.updated.map(|dt| dt.to_rfc3339()),
                "updated_parsed": entry.updated.map(time_tuple),
                "authors": entry.authors.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
                "categories": entry.categories.iter().map(|c| c.term.as_str()).collect::<Vec<_>>(),
                "media_content": entry
                    .media
                    .iter()
                    .flat_map(|m| m.content.iter())
                    .filter_map(|c| c.url.as_ref().map(|url| serde_json::json!({ "url": url.to_string() })))
                    .collect::<Vec<_>>(),
                "feed_source": Value::String(feed_source.clone()),
            });
            Ok(PublishUnit::new(topic, serde_json::to_vec(&body)?))
        })
        .collect()
}

fn text_detail(text: &feed_rs::model::Text, language: Option<&str>) -> Value {
    serde_json::json!({
        "type": text.content_type.essence().to_string(),
        "language": language,
        "base": text.src,
        "value": text.content,
    })
}

/// `[year, month, day, hour, minute, second, weekday (Monday = 0), day of
/// year, dst flag]`.
fn time_tuple(dt: DateTime<Utc>) -> [i64; 9] {
    [
        i64::from(dt.year()),
        i64::from(dt.month()),
        i64::from(dt.day()),
        i64::from(dt.hour()),
        i64::from(dt.minute()),
        i64::from(dt.second()),
        i64::from(dt.weekday().num_days_from_monday()),
        i64::from(dt.ordinal()),
        0,
    ]
}

/// Decomposes payloads and pushes the units through a [`Broker`].
pub struct PublishPipeline<B> {
    broker: B,
}

impl<B: Broker> PublishPipeline<B> {
    pub fn new(broker: B) -> Self {
        Self { broker }
    }

    /// Publish one payload and wait until the broker has acknowledged every
    /// resulting message. Returns the number of messages published.
    ///
    /// Publishing is append-only: the same payload published twice produces
    /// two sets of messages with different keys.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] if the payload cannot be decomposed, or if
    /// the broker rejects, times out on, or cannot be reached for a message.
    pub async fn publish(&self, topic: &str, payload: &Payload) -> Result<usize, PublishError> {
        let units = decompose(topic, payload)?;
        if units.is_empty() {
            return Ok(0);
        }

        for unit in &units {
            let key = unit.key.to_string();
            tracing::debug!(topic = %unit.topic, key = %key, "publishing message");
            if let Err(e) = self
                .broker
                .send(&unit.topic, key.as_bytes(), &unit.body)
                .await
            {
                self.broker.discard_pending();
                return Err(e.into());
            }
        }
        self.broker.flush().await?;

        tracing::info!(topic, messages = units.len(), "published");
        Ok(units.len())
    }
}

#[cfg(test)]
#[path = "publish_test.rs"]
mod tests;
