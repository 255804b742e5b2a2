//! Database connection pool management.

use crate::{JobStore, MySqlJobStore, SqliteJobStore};
use queuectl_config::DatabaseConfig;
use queuectl_core::{QueueError, QueueResult};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Database pool for one of the supported backends, chosen by URL scheme.
#[derive(Clone)]
pub enum DatabasePool {
    /// `sqlite:` URLs.
    Sqlite(SqlitePool),
    /// `mysql://` URLs.
    MySql(MySqlPool),
}

impl DatabasePool {
    /// Creates a new database pool from configuration.
    ///
    /// Runs embedded migrations when `run_migrations` is set.
    pub async fn new(config: &DatabaseConfig) -> QueueResult<Self> {
        let pool = if config.is_sqlite() {
            Self::Sqlite(Self::connect_sqlite(config).await?)
        } else if config.is_mysql() {
            Self::MySql(Self::connect_mysql(config).await?)
        } else {
            return Err(QueueError::configuration(format!(
                "Unsupported database URL scheme: {}",
                config.url
            )));
        };

        if config.run_migrations {
            pool.run_migrations().await?;
        }

        Ok(pool)
    }

    async fn connect_sqlite(config: &DatabaseConfig) -> QueueResult<SqlitePool> {
        info!("Connecting to SQLite database...");

        let in_memory = is_in_memory(&config.url);
        let mut options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .busy_timeout(config.busy_timeout());
        if !in_memory {
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        // Every connection to an in-memory database is a separate database.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new()
                .min_connections(config.min_connections)
                .max_connections(config.max_connections)
                .idle_timeout(Some(config.idle_timeout()))
        };

        let pool = pool_options
            .acquire_timeout(config.connect_timeout())
            .connect_with(options)
            .await
            .map_err(|e| {
                warn!("Failed to connect to database: {}", e);
                QueueError::Database(format!("Failed to connect: {}", e))
            })?;

        info!(in_memory, "SQLite connection pool established");
        Ok(pool)
    }

    async fn connect_mysql(config: &DatabaseConfig) -> QueueResult<MySqlPool> {
        info!("Connecting to MySQL database...");

        let pool = MySqlPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect(&config.url)
            .await
            .map_err(|e| {
                warn!("Failed to connect to database: {}", e);
                QueueError::Database(format!("Failed to connect: {}", e))
            })?;

        info!("MySQL connection pool established");
        Ok(pool)
    }

    /// Returns the backend name.
    #[must_use]
    pub const fn backend(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "sqlite",
            Self::MySql(_) => "mysql",
        }
    }

    /// Builds the job store for this backend.
    #[must_use]
    pub fn job_store(&self) -> Arc<dyn JobStore> {
        match self {
            Self::Sqlite(pool) => Arc::new(SqliteJobStore::new(pool.clone())),
            Self::MySql(pool) => Arc::new(MySqlJobStore::new(pool.clone())),
        }
    }

    /// Checks if the database connection is healthy.
    pub async fn health_check(&self) -> QueueResult<()> {
        let result = match self {
            Self::Sqlite(pool) => sqlx::query("SELECT 1").execute(pool).await.map(|_| ()),
            Self::MySql(pool) => sqlx::query("SELECT 1").execute(pool).await.map(|_| ()),
        };
        result.map_err(|e| QueueError::Database(format!("Health check failed: {}", e)))
    }

    /// Runs database migrations.
    pub async fn run_migrations(&self) -> QueueResult<()> {
        info!(backend = self.backend(), "Running database migrations...");
        match self {
            Self::Sqlite(pool) => sqlx::migrate!("../../migrations/sqlite").run(pool).await?,
            Self::MySql(pool) => sqlx::migrate!("../../migrations/mysql").run(pool).await?,
        }
        info!("Database migrations completed");
        Ok(())
    }

    /// Closes the database pool.
    pub async fn close(&self) {
        info!("Closing database connection pool...");
        match self {
            Self::Sqlite(pool) => pool.close().await,
            Self::MySql(pool) => pool.close().await,
        }
        info!("Database connection pool closed");
    }
}

impl std::fmt::Debug for DatabasePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (size, num_idle) = match self {
            Self::Sqlite(pool) => (pool.size(), pool.num_idle()),
            Self::MySql(pool) => (pool.size(), pool.num_idle()),
        };
        f.debug_struct("DatabasePool")
            .field("backend", &self.backend())
            .field("size", &size)
            .field("num_idle", &num_idle)
            .finish()
    }
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}
