//! # Database Pool Management
//!
//! Connection pool creation and configuration for SQLite.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Handle                                    │
//! │                                                                         │
//! │  Host process startup                                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbConfig::from_env(default) ← TAVOLA_DB_PATH, TAVOLA_DB_MAX_CONNECTIONS│
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │  Database { SqlitePool, IdGenerator }    │  injected, never global   │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       ├── sessions()    ├── kots()         ├── billing()               │
//! │       ├── cart()        ├── adjustments()  ├── splits()                │
//! │       └── snapshots()   └── audit()                                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! SQLite WAL (Write-Ahead Logging) mode is enabled so snapshot reads do
//! not block a command that is writing.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::command::CommandTx;
use crate::error::{DbError, DbResult};
use crate::ids::{IdGenerator, UuidV4Generator};
use crate::migrations;
use crate::repository::adjustment::AdjustmentRepository;
use crate::repository::audit::AuditRepository;
use crate::repository::billing::BillingRepository;
use crate::repository::cart::CartRepository;
use crate::repository::kot::KotRepository;
use crate::repository::session::SessionRepository;
use crate::repository::snapshot::SnapshotRepository;
use crate::repository::split::SplitRepository;

/// Environment variable overriding the database file path.
pub const ENV_DB_PATH: &str = "TAVOLA_DB_PATH";

/// Environment variable overriding the pool size.
pub const ENV_DB_MAX_CONNECTIONS: &str = "TAVOLA_DB_MAX_CONNECTIONS";

const IN_MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/tavola.db")
///     .max_connections(5)
///     .min_connections(1);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5 (sufficient for one terminal)
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection timeout duration.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    ///
    /// The file is created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    /// Builds a configuration from the process environment.
    ///
    /// ## Variables
    /// - `TAVOLA_DB_PATH` - database file (falls back to `default_path`)
    /// - `TAVOLA_DB_MAX_CONNECTIONS` - pool size
    pub fn from_env(default_path: impl Into<PathBuf>) -> DbResult<Self> {
        Self::from_lookup(default_path, |key| std::env::var(key).ok())
    }

    /// Same as [`DbConfig::from_env`] with an explicit variable lookup.
    pub fn from_lookup<F>(default_path: impl Into<PathBuf>, lookup: F) -> DbResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = lookup(ENV_DB_PATH)
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| default_path.into());

        let mut config = DbConfig::new(path);

        if let Some(raw) = lookup(ENV_DB_MAX_CONNECTIONS) {
            let max: u32 = raw.trim().parse().map_err(|_| {
                DbError::InvalidConfig(format!(
                    "{ENV_DB_MAX_CONNECTIONS} must be a positive integer, got '{raw}'"
                ))
            })?;
            if max == 0 {
                return Err(DbError::InvalidConfig(format!(
                    "{ENV_DB_MAX_CONNECTIONS} must be at least 1"
                )));
            }
            config = config.max_connections(max).min_connections(1);
        }

        Ok(config)
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let db = Database::new(DbConfig::in_memory()).await?;
    /// // Database is isolated, perfect for tests
    /// ```
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(IN_MEMORY_PATH),
            max_connections: 1, // In-memory requires single connection
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            run_migrations: true,
        }
    }

    /// Whether this configuration points at an in-memory database.
    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == IN_MEMORY_PATH
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository access.
///
/// Cheap to clone; every clone shares the pool and the id generator.
///
/// ## Usage
/// ```rust,ignore
/// let db = Database::new(DbConfig::from_env("./tavola.db")?).await?;
/// let session_id = db.sessions().create_session("T4", OrderType::DineIn, "staff-1").await?;
/// db.cart().add_to_cart(&session_id, &item).await?;
/// db.kots().create_kot(&session_id, "staff-1", None).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,

    /// Source of every row id written by commands.
    ids: Arc<dyn IdGenerator>,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite:
    ///    - WAL mode for concurrent reads
    ///    - NORMAL synchronous (balance of safety/speed)
    ///    - Foreign keys enabled
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let connect_url = if config.is_in_memory() {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", config.database_path.display())
        };

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            // Readers don't block writers, writers don't block readers
            .journal_mode(SqliteJournalMode::Wal)
            // May lose the last transaction on power loss, never corrupts
            .synchronous(SqliteSynchronous::Normal)
            // SQLite has them disabled by default for backwards compatibility
            .foreign_keys(true)
            .create_if_missing(true);

        debug!("Connection options configured");

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout);

        // An in-memory database lives only as long as its connection
        pool_options = if config.is_in_memory() {
            pool_options.idle_timeout(None).max_lifetime(None)
        } else {
            pool_options.idle_timeout(Some(config.idle_timeout))
        };

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database {
            pool,
            ids: Arc::new(UuidV4Generator),
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Replaces the identifier service (deterministic ids in tests).
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Runs database migrations.
    ///
    /// Called by `new()` when `run_migrations` is set. Idempotent.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns `(total, applied)` migration counts.
    pub async fn migration_status(&self) -> DbResult<(usize, usize)> {
        migrations::migration_status(&self.pool).await
    }

    /// Returns a reference to the connection pool.
    ///
    /// For diagnostics and tests. Writes should go through repositories so
    /// they are audited.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Opens a command envelope for `staff_id`.
    pub async fn begin_command(&self, staff_id: &str) -> DbResult<CommandTx> {
        CommandTx::begin(&self.pool, self.ids.clone(), staff_id).await
    }

    pub fn sessions(&self) -> SessionRepository {
        SessionRepository::new(self.pool.clone(), self.ids.clone())
    }

    pub fn cart(&self) -> CartRepository {
        CartRepository::new(self.pool.clone(), self.ids.clone())
    }

    pub fn kots(&self) -> KotRepository {
        KotRepository::new(self.pool.clone(), self.ids.clone())
    }

    pub fn adjustments(&self) -> AdjustmentRepository {
        AdjustmentRepository::new(self.pool.clone(), self.ids.clone())
    }

    pub fn billing(&self) -> BillingRepository {
        BillingRepository::new(self.pool.clone(), self.ids.clone())
    }

    pub fn splits(&self) -> SplitRepository {
        SplitRepository::new(self.pool.clone(), self.ids.clone())
    }

    pub fn snapshots(&self) -> SnapshotRepository {
        SnapshotRepository::new(self.pool.clone())
    }

    pub fn audit(&self) -> AuditRepository {
        AuditRepository::new(self.pool.clone())
    }

    /// Closes the database connection pool.
    ///
    /// After calling close, all repository operations will fail.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        assert!(db.health_check().await);
        let (total, applied) = db.migration_status().await.unwrap();
        assert_eq!(total, applied);
        assert!(total >= 1);
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/test.db")
            .max_connections(10)
            .min_connections(2);

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert!(!config.is_in_memory());
        assert!(DbConfig::in_memory().is_in_memory());
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_DB_PATH, "/data/floor.db"),
            (ENV_DB_MAX_CONNECTIONS, "3"),
        ]);
        let config =
            DbConfig::from_lookup("./tavola.db", |k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/data/floor.db"));
        assert_eq!(config.max_connections, 3);

        let config = DbConfig::from_lookup("./tavola.db", |_| None).unwrap();
        assert_eq!(config.database_path, PathBuf::from("./tavola.db"));
        assert_eq!(config.max_connections, 5);
    }

    #[test]
    fn test_config_rejects_bad_pool_size() {
        let err = DbConfig::from_lookup("./tavola.db", |k| {
            (k == ENV_DB_MAX_CONNECTIONS).then(|| "lots".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, DbError::InvalidConfig(msg) if msg.contains(ENV_DB_MAX_CONNECTIONS)));
    }
}
