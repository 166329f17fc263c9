use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

use super::Job;
use crate::error::Result;

/// Durable home of job records. Each record is the whole job, reports and
/// findings included, keyed by job id.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// All stored jobs in insertion order.
    async fn load_all(&self) -> Result<Vec<Job>>;

    /// Inserts or replaces one job record atomically.
    async fn save(&self, position: i64, job: &Job) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct SqliteJobRepository {
    pool: Pool<Sqlite>,
}

impl SqliteJobRepository {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// A private in-memory database, gone when the repository is dropped.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        // 内存数据库只能使用单个连接，否则每个连接各自一份数据
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn with_pool(pool: Pool<Sqlite>) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY NOT NULL,
                position INTEGER NOT NULL,
                record TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn load_all(&self) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT id, record FROM jobs ORDER BY position ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut jobs = Vec::with_capacity(rows.len());
        for (id, record) in rows {
            match serde_json::from_str::<Job>(&record) {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    // 跳过损坏的记录，不影响其他任务加载
                    tracing::error!(job_id = %id, error = %e, "failed to decode stored job, skipped");
                }
            }
        }
        Ok(jobs)
    }

    async fn save(&self, position: i64, job: &Job) -> Result<()> {
        let record = serde_json::to_string(job)?;
        sqlx::query(
            "INSERT INTO jobs (id, position, record, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                position = excluded.position,
                record = excluded.record,
                updated_at = excluded.updated_at",
        )
        .bind(&job.id)
        .bind(position)
        .bind(&record)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
