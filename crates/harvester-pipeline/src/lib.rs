//! The harvesting engine: bounded fan-out of fetches, payload decomposition
//! and publishing, trend-driven stream rules, and the batch and streaming
//! drivers that tie them together.

mod backoff;
pub mod broker;
pub mod error;
pub mod fan_out;
pub mod orchestrator;
pub mod publish;
pub mod report;
pub mod stream;
pub mod trends;

#[cfg(test)]
mod test_support;

pub use broker::{Broker, BrokerError, KafkaBroker};
pub use error::{PipelineError, PublishError, ReconcileError};
pub use fan_out::FanOut;
pub use orchestrator::{report_aborted_run, run_batch, BatchOptions};
pub use publish::{decompose, PublishPipeline, PublishUnit, TopicFamily};
pub use report::TracingReportSink;
pub use stream::{run_stream_session, StreamSessionConfig, StreamStats};
pub use trends::{ReconcileOutcome, ReconcilerState, RuleSet, TrendReconciler, TrendSet};
