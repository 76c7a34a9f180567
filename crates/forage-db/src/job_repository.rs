use chrono::NaiveDate;
use sqlx::{PgPool, Pool, Postgres};

use forage_core::JobRecord;
use forage_core::error::AppError;
use forage_core::traits::{JobStore, UpsertOutcome};

/// PostgreSQL repository for normalized job records.
///
/// Insert-if-absent on `identity_key`, which is exactly the
/// orchestrator's dedupe key — a record the orchestrator considers a
/// duplicate can never create a second row.
#[derive(Clone)]
pub struct JobRepository {
    pool: Pool<Postgres>,
}

impl JobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a record unless its identity key is already present.
    pub async fn upsert(&self, record: &JobRecord) -> Result<UpsertOutcome, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (
                identity_key, job_source_id, source, title, company, location,
                salary, url, tags, date_posted, date_found, description, is_remote
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (identity_key) DO NOTHING
            "#,
        )
        .bind(record.identity_key())
        .bind(&record.source_id)
        .bind(&record.source)
        .bind(&record.title)
        .bind(&record.company)
        .bind(&record.location)
        .bind(&record.salary)
        .bind(&record.url)
        .bind(&record.tags)
        .bind(record.date_posted)
        .bind(record.date_found)
        .bind(&record.description)
        .bind(record.is_remote)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 1 {
            Ok(UpsertOutcome::Inserted)
        } else {
            tracing::debug!(
                identity_key = %record.identity_key(),
                source = %record.source,
                "Record already present; insert skipped"
            );
            Ok(UpsertOutcome::AlreadyPresent)
        }
    }

    /// Most recently discovered records, newest first.
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<JobRecord>, AppError> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT job_source_id, source, title, company, location, salary,
                   url, tags, date_posted, date_found, description, is_remote
            FROM jobs
            ORDER BY date_found DESC, created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Total stored records.
    pub async fn count(&self) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as(r#"SELECT COUNT(*) FROM jobs"#)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(count)
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(())
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct JobRow {
    job_source_id: Option<String>,
    source: String,
    title: String,
    company: String,
    location: Option<String>,
    salary: Option<String>,
    url: String,
    tags: Vec<String>,
    date_posted: Option<NaiveDate>,
    date_found: NaiveDate,
    description: Option<String>,
    is_remote: bool,
}

impl From<JobRow> for JobRecord {
    fn from(row: JobRow) -> Self {
        JobRecord {
            source_id: row.job_source_id,
            source: row.source,
            title: row.title,
            company: row.company,
            location: row.location,
            salary: row.salary,
            url: row.url,
            tags: row.tags,
            date_posted: row.date_posted,
            date_found: row.date_found,
            description: row.description,
            is_remote: row.is_remote,
        }
    }
}

// -- Trait implementation --

impl JobStore for JobRepository {
    async fn upsert(&self, record: &JobRecord) -> Result<UpsertOutcome, AppError> {
        JobRepository::upsert(self, record).await
    }
}
