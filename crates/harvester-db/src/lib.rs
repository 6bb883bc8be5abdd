//! Postgres persistence for run reports.

use std::time::Duration;

use harvester_core::DatabaseConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

pub mod job_runs;

pub use job_runs::{insert_job_run, list_job_runs, JobRunRow, PgJobReportSink};

// Relative to this crate's manifest: <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database.url is not set")]
    MissingUrl,
    #[error("{field} value {value} does not fit the column type")]
    OutOfRange { field: &'static str, value: u64 },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

fn pool_options(database: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(database.max_connections)
        .acquire_timeout(Duration::from_secs(database.acquire_timeout_secs))
}

/// Open the job-run ledger and bring its schema up to date.
///
/// # Errors
///
/// Returns [`DbError::MissingUrl`] when no URL is configured, otherwise the
/// connection or migration failure.
pub async fn connect(database: &DatabaseConfig) -> Result<PgPool, DbError> {
    let url = database.url.as_deref().ok_or(DbError::MissingUrl)?;
    let pool = pool_options(database).connect(url).await?;
    MIGRATOR.run(&pool).await?;
    tracing::debug!(
        max_connections = database.max_connections,
        "job-run schema is up to date"
    );
    Ok(pool)
}
