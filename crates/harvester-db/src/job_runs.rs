use async_trait::async_trait;
use chrono::{DateTime, Utc};
use harvester_core::{JobReportSink, ReportError, RunSummary};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `job_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub data_source: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub successful_events: i64,
    pub failed_events: i64,
    pub logfile: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn to_bigint(field: &'static str, value: u64) -> Result<i64, DbError> {
    i64::try_from(value).map_err(|_| DbError::OutOfRange { field, value })
}

/// Insert one finished run and return the stored row.
///
/// # Errors
///
/// Returns [`DbError::OutOfRange`] if a counter exceeds the column range, or
/// [`DbError::Sqlx`] if the insert fails.
pub async fn insert_job_run(pool: &PgPool, summary: &RunSummary) -> Result<JobRunRow, DbError> {
    let successful = to_bigint("successful_events", summary.successful_events)?;
    let failed = to_bigint("failed_events", summary.failed_events)?;

    let row = sqlx::query_as::<_, JobRunRow>(
        "INSERT INTO job_runs \
             (public_id, data_source, start_time, end_time, duration_seconds, \
              successful_events, failed_events, logfile) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING id, public_id, data_source, start_time, end_time, duration_seconds, \
                   successful_events, failed_events, logfile, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(summary.data_source.as_str())
    .bind(summary.start_time)
    .bind(summary.end_time)
    .bind(summary.duration_seconds)
    .bind(successful)
    .bind(failed)
    .bind(summary.logfile.as_deref())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// List the most recent runs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_job_runs(pool: &PgPool, limit: i64) -> Result<Vec<JobRunRow>, DbError> {
    let rows = sqlx::query_as::<_, JobRunRow>(
        "SELECT id, public_id, data_source, start_time, end_time, duration_seconds, \
                successful_events, failed_events, logfile, created_at \
         FROM job_runs \
         ORDER BY start_time DESC, id DESC \
         LIMIT $1",
    )
    .bind(limit.max(0))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Job report sink backed by the `job_runs` table.
#[derive(Debug, Clone)]
pub struct PgJobReportSink {
    pool: PgPool,
}

impl PgJobReportSink {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl JobReportSink for PgJobReportSink {
    async fn insert(&self, summary: &RunSummary) -> Result<(), ReportError> {
        let row = insert_job_run(&self.pool, summary)
            .await
            .map_err(|e| ReportError::Persist(Box::new(e)))?;
        tracing::debug!(id = row.id, data_source = %row.data_source, "job run stored");
        Ok(())
    }
}
