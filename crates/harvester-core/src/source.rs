//! Contract between the orchestrator and the per-source API clients.

use async_trait::async_trait;

use crate::types::{DataSource, FailureKind, HarvestItem, Payload};

/// An error raised while fetching a single item that knows how it should be
/// counted.
pub trait ItemError: std::error::Error + Send + Sync + 'static {
    fn failure_kind(&self) -> FailureKind;
}

/// A harvestable source: enumerates work items and fetches them one by one.
///
/// `fetch` must be safe to call concurrently from many workers.
#[async_trait]
pub trait SourceClient: Send + Sync + 'static {
    type Error: ItemError;

    fn data_source(&self) -> DataSource;

    /// Broker topic the fetched payloads belong on.
    fn topic(&self) -> &'static str {
        self.data_source().topic()
    }

    /// List the items to harvest in this run.
    ///
    /// # Errors
    ///
    /// A failure here is fatal to the run: there is nothing to process.
    async fn enumerate(&self) -> Result<Vec<HarvestItem>, Self::Error>;

    /// Fetch and normalize one item.
    ///
    /// # Errors
    ///
    /// Returns an [`ItemError`] classified as a request or unexpected failure.
    async fn fetch(&self, item: &HarvestItem) -> Result<Payload, Self::Error>;
}
