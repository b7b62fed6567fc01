//! Database connection and operations for the auth database.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::{debug, info};

use crate::crypto::TokenCipher;
use crate::error::AuthResult;

/// Auth database handle.
///
/// Manages the SQLite connection pool for the database that stores users,
/// provider credential links, in-flight handshake attempts, and browser
/// sessions. When constructed with a [`TokenCipher`], provider credentials
/// are sealed on write and unsealed on read; without one they are stored as
/// plaintext (tests only).
#[derive(Debug, Clone)]
pub struct AuthDb {
    pool: SqlitePool,
    cipher: Option<TokenCipher>,
}

impl AuthDb {
    /// Open or create the auth database at the given path.
    ///
    /// Creates the file if missing, runs pending migrations, and configures
    /// SQLite for concurrent request handlers (WAL mode, foreign keys on).
    pub async fn open(path: impl AsRef<Path>, cipher: Option<TokenCipher>) -> AuthResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty() && !p.exists()) {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening auth database: {}", path.display());

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .pragma("synchronous", "NORMAL")
            .pragma("temp_store", "MEMORY")
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        debug!("Auth database connection established");

        Self::run_migrations(&pool).await?;

        Ok(Self { pool, cipher })
    }

    /// Open an in-memory database without at-rest encryption (for testing).
    pub async fn open_in_memory() -> AuthResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            // In-memory must be single connection to share state
            .max_connections(1)
            .connect_with(options)
            .await?;

        Self::run_migrations(&pool).await?;

        Ok(Self { pool, cipher: None })
    }

    async fn run_migrations(pool: &SqlitePool) -> AuthResult<()> {
        debug!("Running auth database migrations");
        sqlx::migrate!("./migrations").run(pool).await?;
        info!("Auth database migrations complete");
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Check if the database is healthy.
    pub async fn health_check(&self) -> AuthResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Seal a credential for storage.
    pub(crate) fn seal(&self, value: &str) -> AuthResult<String> {
        match &self.cipher {
            Some(cipher) => cipher.seal(value),
            None => Ok(value.to_string()),
        }
    }

    /// Unseal a stored credential.
    pub(crate) fn unseal(&self, value: &str) -> AuthResult<String> {
        match &self.cipher {
            Some(cipher) => cipher.unseal(value),
            None => Ok(value.to_string()),
        }
    }
}
