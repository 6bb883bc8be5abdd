//! API clients for the harvested sources: a feed index, a discussion site,
//! and a microblog with both search and a filtered live stream.

pub mod error;
pub mod feed_index;
pub(crate) mod http;
pub mod reddit;
pub mod source;
pub mod twitter;
pub mod twitter_stream;

use harvester_core::Record;
use serde::Serialize;

pub use error::SourceError;
pub use feed_index::FeedIndexClient;
pub use reddit::RedditClient;
pub use source::Source;
pub use twitter::{TwitterAuth, TwitterClient};
pub use twitter_stream::TwitterStream;

/// Serialize a typed record into the untyped map the publish pipeline takes.
pub(crate) fn into_record<T: Serialize>(value: &T, context: &str) -> Result<Record, SourceError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(SourceError::Api(format!(
            "{context} serialized to {other} instead of an object"
        ))),
        Err(source) => Err(SourceError::Deserialize {
            context: context.to_string(),
            source,
        }),
    }
}
