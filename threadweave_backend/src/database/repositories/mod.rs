mod threads;
mod users;

use super::models::{ThreadRecord, UserRecord};
use anyhow::Result;
use rusqlite::Connection;

pub trait ThreadRepository {
    fn create(&self, record: &ThreadRecord) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<ThreadRecord>>;
    /// Appends `child_id` to the end of the parent's child list unless it is
    /// already present. Returns whether a link was added.
    fn append_child(&self, parent_id: &str, child_id: &str) -> Result<bool>;
    fn children_of(&self, parent_id: &str) -> Result<Vec<String>>;
    fn list_top_level(&self, skip: usize, limit: usize) -> Result<Vec<ThreadRecord>>;
    fn count_top_level(&self) -> Result<usize>;
    fn count(&self) -> Result<usize>;
    /// Newest `created_at` across all threads, comments included.
    fn latest_created_at(&self) -> Result<Option<String>>;
    fn list_authored(&self, user_id: &str) -> Result<Vec<ThreadRecord>>;
    /// Replies whose parent does not list them as a child.
    fn unlinked_replies(&self) -> Result<Vec<ThreadRecord>>;
}

pub trait UserRepository {
    fn upsert(&self, record: &UserRecord) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<UserRecord>>;
    fn add_authored_thread(&self, user_id: &str, thread_id: &str) -> Result<bool>;
    fn authored_thread_ids(&self, user_id: &str) -> Result<Vec<String>>;
}

pub struct SqliteRepositories<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRepositories<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn threads(&self) -> impl ThreadRepository + '_ {
        threads::SqliteThreadRepository { conn: self.conn }
    }

    pub fn users(&self) -> impl UserRepository + '_ {
        users::SqliteUserRepository { conn: self.conn }
    }

    /// Runs `f` inside a single SQLite transaction. Any error rolls back
    /// every write `f` made.
    pub fn in_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        let tx = self.conn.unchecked_transaction()?;
        let value = f(self)?;
        tx.commit()?;
        Ok(value)
    }
}
