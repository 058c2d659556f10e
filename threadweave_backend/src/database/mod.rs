pub mod models;
pub mod repositories;

use crate::config::ThreadweavePaths;
use anyhow::{anyhow, Context, Result};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

pub(crate) const MIGRATIONS: &str = r#"
    PRAGMA journal_mode = WAL;
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        username TEXT NOT NULL UNIQUE,
        image TEXT,
        onboarded INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS threads (
        id TEXT PRIMARY KEY,
        text TEXT NOT NULL CHECK (length(text) > 0),
        author_id TEXT NOT NULL,
        parent_id TEXT,
        community_id TEXT,
        created_at TEXT NOT NULL,
        FOREIGN KEY (author_id) REFERENCES users(id),
        FOREIGN KEY (parent_id) REFERENCES threads(id)
    );

    CREATE TABLE IF NOT EXISTS thread_children (
        parent_id TEXT NOT NULL,
        child_id TEXT NOT NULL,
        position INTEGER NOT NULL,
        PRIMARY KEY (parent_id, child_id),
        FOREIGN KEY (parent_id) REFERENCES threads(id),
        FOREIGN KEY (child_id) REFERENCES threads(id)
    );

    CREATE TABLE IF NOT EXISTS user_threads (
        user_id TEXT NOT NULL,
        thread_id TEXT NOT NULL,
        PRIMARY KEY (user_id, thread_id),
        FOREIGN KEY (user_id) REFERENCES users(id),
        FOREIGN KEY (thread_id) REFERENCES threads(id)
    );

    CREATE INDEX IF NOT EXISTS idx_threads_top_level ON threads(created_at) WHERE parent_id IS NULL;
    CREATE INDEX IF NOT EXISTS idx_threads_parent ON threads(parent_id);
    CREATE INDEX IF NOT EXISTS idx_threads_created ON threads(created_at);
    CREATE INDEX IF NOT EXISTS idx_thread_children_order ON thread_children(parent_id, position);
"#;

/// Process-wide handle to the Store.
///
/// Open it once at startup (see [`crate::bootstrap::initialize`]), clone it
/// into every service, and call [`Database::close`] on shutdown. Clones share
/// the same connection; after `close` every operation fails instead of
/// silently reconnecting.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Option<Connection>>>,
    newly_created: bool,
}

impl Database {
    pub fn connect(paths: &ThreadweavePaths) -> Result<Self> {
        let newly_created = !paths.db_path.exists();
        let conn = Connection::open(&paths.db_path)
            .with_context(|| format!("failed to open {}", paths.db_path.display()))?;
        Ok(Self::from_connection(conn, newly_created))
    }

    pub fn from_connection(conn: Connection, newly_created: bool) -> Self {
        Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            newly_created,
        }
    }

    /// Migrated in-memory database, used by tests and throwaway tooling.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self::from_connection(conn, true);
        db.ensure_migrations()?;
        Ok(db)
    }

    pub fn ensure_migrations(&self) -> Result<bool> {
        self.with_conn(|conn| {
            conn.execute_batch(MIGRATIONS)
                .context("failed to apply schema migrations")?;
            Ok(())
        })?;
        Ok(self.newly_created)
    }

    pub fn with_repositories<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(repositories::SqliteRepositories<'_>) -> Result<T>,
    {
        self.with_conn(|conn| {
            let repos = repositories::SqliteRepositories::new(conn);
            f(repos)
        })
    }

    /// Runs `f` against the repositories on the blocking pool so async
    /// callers never hold the connection mutex on a runtime worker.
    pub async fn call<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(repositories::SqliteRepositories<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let database = self.clone();
        let result = tokio::task::spawn_blocking(move || database.with_repositories(f))
            .await
            .context("database task did not complete")?;
        result
    }

    pub fn close(&self) -> Result<()> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| anyhow!("database mutex poisoned"))?;
        if let Some(conn) = guard.take() {
            conn.close()
                .map_err(|(_, err)| anyhow::Error::new(err))
                .context("failed to close database")?;
            tracing::info!("database connection closed");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.conn.lock().map(|guard| guard.is_none()).unwrap_or(true)
    }

    fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let guard = self
            .conn
            .lock()
            .map_err(|_| anyhow!("database mutex poisoned"))?;
        let conn = guard
            .as_ref()
            .ok_or_else(|| anyhow!("database connection closed"))?;
        f(conn)
    }
}
