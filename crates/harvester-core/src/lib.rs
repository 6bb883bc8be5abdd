//! Shared domain types, source contracts, and configuration for the harvester.

pub mod app_config;
pub mod config;
pub mod error;
pub mod logfile;
pub mod report;
pub mod source;
pub mod stream;
pub mod types;

pub use app_config::{
    AppConfig, DatabaseConfig, GeneralConfig, KafkaConfig, RedditConfig, StreamRetryConfig,
    TwitterConfig,
};
pub use config::load_app_config;
pub use error::ConfigError;
pub use logfile::build_log_path;
pub use report::{JobReportSink, ReportError, RunSummary, RunTally};
pub use source::{ItemError, SourceClient};
pub use stream::{FilterRule, NewRule, RuleStore, StreamEvent, StreamTransport, TrendSource};
pub use types::{
    DataSource, FailureKind, HarvestItem, HarvestResult, Payload, Record, REDDIT_TOPIC,
    RSS_TOPIC, TWITTER_STREAM_TOPIC, TWITTER_TOPIC,
};
