use crate::database::models::ThreadRecord;
use crate::database::repositories::ThreadRepository;
use crate::database::Database;
use crate::error::{PersistenceContext, ThreadError, ThreadResult};
use crate::invalidation::SharedSignal;
use crate::threading::{stamp_created_at, validate_text};
use crate::utils::now_utc_iso;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Creates replies and links them into their parent's child list.
///
/// Comments are not added to the commenter's authored-thread index; that
/// index tracks top-level posts only.
#[derive(Clone)]
pub struct CommentLinker {
    database: Database,
    signal: SharedSignal,
}

impl CommentLinker {
    pub fn new(database: Database, signal: SharedSignal) -> Self {
        Self { database, signal }
    }

    /// Creates a comment under `input.parent_id` and links it.
    ///
    /// The parent lookup happens before any write, so a missing parent leaves
    /// the store untouched. The insert and the link commit together and the
    /// link uses an append-unique statement, so concurrent replies to the
    /// same parent cannot overwrite each other's links.
    pub async fn add_comment(&self, input: AddCommentInput) -> ThreadResult<String> {
        validate_text(&input.text)?;
        if input.author_id.trim().is_empty() {
            return Err(ThreadError::validation("author id is required"));
        }

        let mut stored = ThreadRecord {
            id: Uuid::new_v4().to_string(),
            text: input.text,
            author_id: input.author_id,
            parent_id: Some(input.parent_id.clone()),
            community_id: None,
            created_at: now_utc_iso(),
        };
        let parent_id = input.parent_id.clone();
        let linked = self
            .database
            .call(move |repos| {
                if repos.threads().get(&parent_id)?.is_none() {
                    return Ok(None);
                }
                let stored = repos.in_transaction(|repos| {
                    stamp_created_at(repos, &mut stored)?;
                    let threads = repos.threads();
                    threads.create(&stored)?;
                    threads.append_child(&parent_id, &stored.id)?;
                    Ok(stored)
                })?;
                Ok(Some(stored))
            })
            .await
            .during("creating comment")?;

        let Some(record) = linked else {
            return Err(ThreadError::thread_not_found(input.parent_id));
        };

        tracing::info!(
            comment_id = %record.id,
            parent_id = %input.parent_id,
            author_id = %record.author_id,
            "linked comment"
        );
        self.signal.notify(&input.invalidation_topic);
        Ok(record.id)
    }

    /// Links every comment whose parent does not list it yet.
    ///
    /// Such comments are fetchable by id but invisible from the parent. They
    /// can come from databases written before linking was transactional or
    /// from rows inserted by other tools. Relinked comments land at the end of
    /// the parent's child list. Returns the ids that were relinked.
    pub async fn reconcile(&self) -> ThreadResult<Vec<String>> {
        let relinked = self
            .database
            .call(|repos| {
                let threads = repos.threads();
                let mut relinked = Vec::new();
                for reply in threads.unlinked_replies()? {
                    let Some(parent_id) = reply.parent_id.as_deref() else {
                        continue;
                    };
                    if threads.append_child(parent_id, &reply.id)? {
                        relinked.push(reply.id);
                    }
                }
                Ok(relinked)
            })
            .await
            .during("reconciling comments")?;

        if relinked.is_empty() {
            tracing::debug!("no unlinked comments found");
        } else {
            tracing::warn!(count = relinked.len(), ids = ?relinked, "relinked orphaned comments");
        }
        Ok(relinked)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddCommentInput {
    pub parent_id: String,
    pub text: String,
    pub author_id: String,
    #[serde(default)]
    pub invalidation_topic: String,
}
