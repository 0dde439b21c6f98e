use anyhow::{Context, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

use super::schema::{schema_sql, DEMO_DATA};

/// SQLite in-memory database identifier
const MEMORY_DB_PATH: &str = ":memory:";

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Database wrapper with connection pooling support
#[derive(Clone)]
pub struct Database {
    pub pool: DbPool,
}

impl Database {
    /// Create a new database connection pool
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let in_memory = Self::is_memory_path(path.as_ref());
        let manager = Self::create_connection_manager(path, in_memory);

        // Every in-memory connection is its own database, so keep exactly one
        let builder = if in_memory {
            Pool::builder().max_size(1)
        } else {
            Pool::builder()
        };
        let pool = builder
            .build(manager)
            .context("Failed to create database connection pool")?;
        Ok(Self { pool })
    }

    fn is_memory_path(path: &Path) -> bool {
        path.to_string_lossy()
            .trim()
            .eq_ignore_ascii_case(MEMORY_DB_PATH)
    }

    /// Create a connection manager for file or memory storage.
    ///
    /// Foreign key enforcement is off by default in SQLite, so every
    /// connection turns it on before it is handed out.
    fn create_connection_manager<P: AsRef<Path>>(path: P, in_memory: bool) -> SqliteConnectionManager {
        let manager = if in_memory {
            SqliteConnectionManager::memory()
        } else {
            SqliteConnectionManager::file(path)
        };
        manager.with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"))
    }

    /// Create an in-memory database pool (useful for testing)
    pub fn in_memory() -> Result<Self> {
        Self::new(MEMORY_DB_PATH)
    }

    /// Initialize the database schema
    pub fn initialize(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(&schema_sql())
            .context("Failed to initialize database schema")?;
        tracing::debug!("Database schema initialized");
        Ok(())
    }

    /// Seed the database with demo data
    pub fn seed_demo_data(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(DEMO_DATA)
            .context("Failed to seed demo data")?;
        Ok(())
    }

    /// Get a connection from the pool
    pub fn connection(&self) -> Result<DbConnection> {
        self.pool
            .get()
            .context("Failed to get database connection from pool")
    }
}
