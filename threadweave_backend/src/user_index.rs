//! Per-user index of authored top-level posts, kept for "my posts" views.

use crate::database::repositories::{SqliteRepositories, ThreadRepository, UserRepository};
use crate::database::Database;
use crate::error::{PersistenceContext, ThreadError, ThreadResult};
use crate::threading::{ExpandedThread, Expander, LISTING_DEPTH};
use anyhow::Result;

/// Adds `thread_id` to the author's index. Runs inside the caller's
/// transaction so the post and its index entry commit together.
pub(crate) fn record_authored(
    repos: &SqliteRepositories<'_>,
    user_id: &str,
    thread_id: &str,
) -> Result<()> {
    if !repos.users().add_authored_thread(user_id, thread_id)? {
        tracing::debug!(user_id, thread_id, "thread already indexed for author");
    }
    Ok(())
}

#[derive(Clone)]
pub struct UserIndex {
    database: Database,
}

impl UserIndex {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Ids of the top-level posts `user_id` created. Order is not meaningful.
    pub async fn authored_thread_ids(&self, user_id: &str) -> ThreadResult<Vec<String>> {
        let lookup = user_id.to_string();
        let ids = self
            .database
            .call(move |repos| {
                if repos.users().get(&lookup)?.is_none() {
                    return Ok(None);
                }
                let ids = repos.users().authored_thread_ids(&lookup)?;
                Ok(Some(ids))
            })
            .await
            .during("fetching authored threads")?;
        ids.ok_or_else(|| ThreadError::user_not_found(user_id))
    }

    /// The user's posts, newest first, expanded the same way as listing items.
    pub async fn list_authored(&self, user_id: &str) -> ThreadResult<Vec<ExpandedThread>> {
        let lookup = user_id.to_string();
        let threads = self
            .database
            .call(move |repos| {
                if repos.users().get(&lookup)?.is_none() {
                    return Ok(None);
                }
                let records = repos.threads().list_authored(&lookup)?;
                let mut expander = Expander::new(&repos);
                let mut threads = Vec::with_capacity(records.len());
                for record in records {
                    threads.push(expander.expand(record, LISTING_DEPTH)?);
                }
                Ok(Some(threads))
            })
            .await
            .during("fetching user posts")?;
        threads.ok_or_else(|| ThreadError::user_not_found(user_id))
    }
}
