//! Command handlers. Each one sets up logging, the report sink and the
//! broker, then hands over to the pipeline crate.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use harvester_core::{build_log_path, AppConfig, DataSource, JobReportSink};
use harvester_pipeline::{
    report_aborted_run, run_batch, run_stream_session, BatchOptions, KafkaBroker,
    PublishPipeline, StreamSessionConfig, TracingReportSink, TrendReconciler,
};
use harvester_sources::{
    FeedIndexClient, RedditClient, Source, TwitterAuth, TwitterClient, TwitterStream,
};
use tokio_util::sync::CancellationToken;

use crate::logging::init_logging;

/// What a batch command harvests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Target {
    Rss { base_url: String },
    Reddit,
    Twitter,
}

impl Target {
    pub(crate) fn data_source(&self) -> DataSource {
        match self {
            Target::Rss { .. } => DataSource::Rss,
            Target::Reddit => DataSource::Reddit,
            Target::Twitter => DataSource::Twitter,
        }
    }
}

fn build_source(config: &AppConfig, target: &Target) -> anyhow::Result<Source> {
    let timeout = config.general.request_timeout_secs;
    let source = match target {
        Target::Rss { base_url } => Source::FeedIndex(FeedIndexClient::new(
            base_url,
            &config.rss_header,
            timeout,
        )?),
        Target::Reddit => {
            let (id, secret) = config.reddit.credentials()?;
            Source::Discussion(RedditClient::new(
                id,
                secret,
                &config.reddit.user_agent,
                &config.reddit.subreddits,
                timeout,
            )?)
        }
        Target::Twitter => {
            let auth = TwitterAuth::from_config(&config.twitter)?;
            Source::Microblog(TwitterClient::new(auth, timeout)?)
        }
    };
    Ok(source)
}

/// Database-backed sink when a URL is configured, log-only otherwise.
///
/// A database that cannot be reached does not stop the harvest; the run is
/// reported to the log instead.
async fn open_sink(config: &AppConfig) -> Box<dyn JobReportSink> {
    if config.database.url.is_none() {
        return Box::new(TracingReportSink);
    }
    match harvester_db::connect(&config.database).await {
        Ok(pool) => Box::new(harvester_db::PgJobReportSink::new(pool)),
        Err(e) => {
            tracing::error!(error = %e, "job database unavailable; reporting runs to the log");
            Box::new(TracingReportSink)
        }
    }
}

fn log_path(config: &AppConfig, stem: &str) -> std::path::PathBuf {
    build_log_path(
        &config.general.log_dir,
        stem,
        chrono::Local::now().date_naive(),
    )
}

/// One batch run: enumerate, fetch, publish, report.
pub(crate) async fn run_batch_command(config: &AppConfig, target: Target) -> anyhow::Result<()> {
    let data_source = target.data_source();
    let logfile = log_path(config, data_source.as_str());
    let _guard = init_logging(&config.general, Some(&logfile))?;
    tracing::info!(%data_source, logfile = %logfile.display(), "starting harvest");

    let source = build_source(config, &target)
        .with_context(|| format!("failed to set up {data_source} source"))?;
    let sink = open_sink(config).await;

    let broker = match KafkaBroker::connect(&config.kafka) {
        Ok(broker) => broker,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to kafka");
            report_aborted_run(sink.as_ref(), data_source, Some(&logfile)).await;
            return Err(e).context("failed to connect to kafka");
        }
    };
    let pipeline = PublishPipeline::new(broker);

    let options = BatchOptions {
        max_workers: config.general.max_workers,
        request_timeout: Duration::from_secs(config.general.request_timeout_secs),
        logfile: Some(logfile.clone()),
    };
    let summary = run_batch(Arc::new(source), &pipeline, sink.as_ref(), &options)
        .await
        .with_context(|| format!("{data_source} harvest aborted"))?;

    println!(
        "{data_source}: {}/{} items harvested in {:.1}s (log: {})",
        summary.successful_events,
        summary.total_events(),
        summary.duration_seconds,
        logfile.display()
    );
    Ok(())
}

/// Follow the trending topics on the filtered stream until the stream gives
/// up or the process is interrupted.
pub(crate) async fn run_stream_command(config: &AppConfig) -> anyhow::Result<()> {
    let logfile = log_path(config, "twitter_stream");
    let _guard = init_logging(&config.general, Some(&logfile))?;

    let timeout = config.general.request_timeout_secs;
    let auth = TwitterAuth::from_config(&config.twitter)?;
    let trends = Arc::new(TwitterClient::new(auth.clone(), timeout)?);
    let stream = Arc::new(TwitterStream::new(auth, timeout)?);
    let broker = KafkaBroker::connect(&config.kafka).context("failed to connect to kafka")?;

    let reconciler = Arc::new(TrendReconciler::new(
        trends,
        Arc::clone(&stream),
        config.twitter.trend_woeid,
        Duration::from_secs(config.twitter.trend_refresh_secs),
    ));

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    tracing::info!(
        woeid = config.twitter.trend_woeid,
        logfile = %logfile.display(),
        "starting filtered stream"
    );
    let stats = run_stream_session(
        reconciler,
        stream,
        Arc::new(PublishPipeline::new(broker)),
        StreamSessionConfig::from(&config.twitter.stream_retry),
        shutdown,
    )
    .await;

    println!(
        "twitter stream: {} published, {} failed, {} reconnects (log: {})",
        stats.published,
        stats.failed,
        stats.reconnects,
        logfile.display()
    );
    Ok(())
}

/// Print the most recent job runs.
pub(crate) async fn list_runs(config: &AppConfig, limit: i64) -> anyhow::Result<()> {
    init_logging(&config.general, None)?;
    let pool = harvester_db::connect(&config.database)
        .await
        .context("listing runs needs database.url (or DATABASE_URL)")?;
    let runs = harvester_db::list_job_runs(&pool, limit).await?;
    if runs.is_empty() {
        println!("no job runs recorded");
        return Ok(());
    }

    println!(
        "{:<25} {:<8} {:>9} {:>7} {:>9}  logfile",
        "start", "source", "succeeded", "failed", "seconds"
    );
    for run in runs {
        println!(
            "{:<25} {:<8} {:>9} {:>7} {:>9.1}  {}",
            run.start_time.to_rfc3339(),
            run.data_source,
            run.successful_events,
            run.failed_events,
            run.duration_seconds,
            run.logfile.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, stopping stream");
}
