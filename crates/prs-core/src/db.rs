//! SQLite connection pool and schema migrations.

use crate::PatientResult;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;

const MAX_CONNECTIONS: u32 = 5;

/// Handle to the patient database. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `url`.
    ///
    /// For file databases the parent directory is created first. Foreign keys are
    /// enforced on every connection.
    pub async fn connect(url: &str) -> PatientResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        tracing::debug!("connected to database {}", url);
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Apply any pending migrations from `migrations/`.
    pub async fn migrate(&self) -> PatientResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a transaction. Dropping it without commit rolls it back.
    pub async fn begin(&self) -> PatientResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Cheap round trip used by health checks.
    pub async fn ping(&self) -> PatientResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
