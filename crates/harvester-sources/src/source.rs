//! The batch-mode sources behind one [`SourceClient`] implementation.

use async_trait::async_trait;
use harvester_core::{DataSource, HarvestItem, Payload, SourceClient};

use crate::error::SourceError;
use crate::feed_index::FeedIndexClient;
use crate::reddit::RedditClient;
use crate::twitter::TwitterClient;

/// A configured batch source.
pub enum Source {
    FeedIndex(FeedIndexClient),
    Discussion(RedditClient),
    Microblog(TwitterClient),
}

impl Source {
    fn name(&self) -> &'static str {
        self.data_source().as_str()
    }
}

#[async_trait]
impl SourceClient for Source {
    type Error = SourceError;

    fn data_source(&self) -> DataSource {
        match self {
            Source::FeedIndex(_) => DataSource::Rss,
            Source::Discussion(_) => DataSource::Reddit,
            Source::Microblog(_) => DataSource::Twitter,
        }
    }

    async fn enumerate(&self) -> Result<Vec<HarvestItem>, SourceError> {
        match self {
            Source::FeedIndex(client) => Ok(client
                .feed_urls()
                .await?
                .into_iter()
                .map(HarvestItem::Url)
                .collect()),
            Source::Discussion(client) => client.top_submissions().await,
            Source::Microblog(client) => client.trend_queries().await,
        }
    }

    async fn fetch(&self, item: &HarvestItem) -> Result<Payload, SourceError> {
        match (self, item) {
            (Source::FeedIndex(client), HarvestItem::Url(url)) => {
                client.fetch_feed(url).await.map(Payload::Text)
            }
            (Source::Discussion(client), HarvestItem::Submission(id)) => {
                client.submission(id).await.map(Payload::Record)
            }
            (Source::Microblog(client), HarvestItem::Query(query)) => {
                client.search(query).await.map(Payload::Records)
            }
            _ => Err(SourceError::UnsupportedItem {
                source_name: self.name(),
                item: item.to_string(),
            }),
        }
    }
}
