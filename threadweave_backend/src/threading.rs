use crate::config::{DEFAULT_MAX_DEPTH, MAX_EXPANSION_DEPTH};
use crate::database::models::{ThreadRecord, UserRecord};
use crate::database::repositories::{SqliteRepositories, ThreadRepository, UserRepository};
use crate::database::Database;
use crate::error::{PersistenceContext, ThreadError, ThreadResult};
use crate::invalidation::SharedSignal;
use crate::user_index;
use crate::utils::{now_utc_iso, timestamp_after};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Listing items expand their direct replies but nothing below them.
pub const LISTING_DEPTH: usize = 1;

#[derive(Clone)]
pub struct ThreadService {
    database: Database,
    signal: SharedSignal,
    max_depth: usize,
}

impl ThreadService {
    pub fn new(database: Database, signal: SharedSignal) -> Self {
        Self {
            database,
            signal,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Clamped to [`MAX_EXPANSION_DEPTH`].
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.min(MAX_EXPANSION_DEPTH);
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Persists a new top-level post and records it in the author's index.
    ///
    /// Both writes share one transaction; the invalidation signal fires only
    /// after they commit.
    pub async fn create_post(&self, input: CreatePostInput) -> ThreadResult<String> {
        validate_text(&input.text)?;
        if input.author_id.trim().is_empty() {
            return Err(ThreadError::validation("author id is required"));
        }

        let mut stored = ThreadRecord {
            id: Uuid::new_v4().to_string(),
            text: input.text,
            author_id: input.author_id,
            parent_id: None,
            community_id: input.community_id.filter(|id| !id.trim().is_empty()),
            created_at: now_utc_iso(),
        };

        let record = self
            .database
            .call(move |repos| {
                repos.in_transaction(|repos| {
                    stamp_created_at(repos, &mut stored)?;
                    repos.threads().create(&stored)?;
                    user_index::record_authored(repos, &stored.author_id, &stored.id)?;
                    Ok(stored)
                })
            })
            .await
            .during("creating thread")?;

        tracing::info!(
            thread_id = %record.id,
            author_id = %record.author_id,
            community_id = ?record.community_id,
            created_at = %record.created_at,
            "created post"
        );
        self.signal.notify(&input.invalidation_topic);
        Ok(record.id)
    }

    /// Lists top-level posts newest first.
    ///
    /// The total used for `has_next` comes from a separate count query, not a
    /// snapshot shared with the page query. A post inserted between the two
    /// can make `has_next` disagree with the page by one; callers tolerate it.
    pub async fn list_top_level(&self, page_number: usize, page_size: usize) -> ThreadResult<ThreadPage> {
        if page_number == 0 {
            return Err(ThreadError::validation("page number starts at 1"));
        }
        let skip = match (page_number - 1).checked_mul(page_size) {
            Some(skip) if i64::try_from(skip).is_ok() => skip,
            _ => {
                tracing::debug!(page_number, page_size, "page lies beyond any storable offset");
                return Ok(ThreadPage {
                    items: Vec::new(),
                    has_next: false,
                });
            }
        };

        let items = self
            .database
            .call(move |repos| {
                let records = repos.threads().list_top_level(skip, page_size)?;
                let mut expander = Expander::new(&repos);
                let mut items = Vec::with_capacity(records.len());
                for record in records {
                    items.push(expander.expand(record, LISTING_DEPTH)?);
                }
                Ok(items)
            })
            .await
            .during("fetching posts")?;

        let total = self
            .database
            .call(|repos| repos.threads().count_top_level())
            .await
            .during("fetching posts")?;

        let has_next = total > skip.saturating_add(items.len());
        tracing::debug!(page_number, page_size, returned = items.len(), total, "listed posts");
        Ok(ThreadPage { items, has_next })
    }

    /// Fetches a thread with its reply tree expanded to the configured depth.
    pub async fn get_by_id(&self, id: &str) -> ThreadResult<ExpandedThread> {
        self.get_by_id_with_depth(id, self.max_depth).await
    }

    /// Fetches a thread and expands `max_depth` levels of replies below it.
    /// Replies deeper than that are returned as bare ids. Depths above
    /// [`MAX_EXPANSION_DEPTH`] are rejected.
    pub async fn get_by_id_with_depth(
        &self,
        id: &str,
        max_depth: usize,
    ) -> ThreadResult<ExpandedThread> {
        if max_depth > MAX_EXPANSION_DEPTH {
            return Err(ThreadError::validation(format!(
                "max depth {max_depth} exceeds the limit of {MAX_EXPANSION_DEPTH}"
            )));
        }
        let thread_id = id.to_string();
        let expanded = self
            .database
            .call(move |repos| {
                let Some(record) = repos.threads().get(&thread_id)? else {
                    return Ok(None);
                };
                let mut expander = Expander::new(&repos);
                let expanded = expander.expand(record, max_depth)?;
                Ok(Some(expanded))
            })
            .await
            .during("fetching thread")?;

        expanded.ok_or_else(|| ThreadError::thread_not_found(id))
    }
}

/// Moves `record.created_at` past the newest stored timestamp when the wall
/// clock has not advanced, so insert order and `created_at` order agree.
/// Must run inside the write transaction.
pub(crate) fn stamp_created_at(
    repos: &SqliteRepositories<'_>,
    record: &mut ThreadRecord,
) -> Result<()> {
    if let Some(latest) = repos.threads().latest_created_at()? {
        if latest >= record.created_at {
            let bumped = timestamp_after(&latest)?;
            tracing::debug!(
                clock = %record.created_at,
                stored = %latest,
                assigned = %bumped,
                "created_at bumped past newest thread"
            );
            record.created_at = bumped;
        }
    }
    Ok(())
}

pub(crate) fn validate_text(text: &str) -> ThreadResult<()> {
    if text.trim().is_empty() {
        return Err(ThreadError::validation("thread text may not be empty"));
    }
    Ok(())
}

/// Resolves author and child references for a batch of threads, caching
/// author lookups across the whole batch.
pub(crate) struct Expander<'a, 'conn> {
    repos: &'a SqliteRepositories<'conn>,
    authors: HashMap<String, AuthorSummary>,
}

impl<'a, 'conn> Expander<'a, 'conn> {
    pub(crate) fn new(repos: &'a SqliteRepositories<'conn>) -> Self {
        Self {
            repos,
            authors: HashMap::new(),
        }
    }

    fn author(&mut self, author_id: &str) -> Result<AuthorSummary> {
        if let Some(author) = self.authors.get(author_id) {
            return Ok(author.clone());
        }
        let user = self
            .repos
            .users()
            .get(author_id)?
            .with_context(|| format!("author {author_id} missing"))?;
        let summary = AuthorSummary::from_record(user);
        self.authors.insert(author_id.to_string(), summary.clone());
        Ok(summary)
    }

    pub(crate) fn expand(&mut self, record: ThreadRecord, depth: usize) -> Result<ExpandedThread> {
        let repos = self.repos;
        let author = self.author(&record.author_id)?;
        let child_ids = repos.threads().children_of(&record.id)?;
        let mut children = Vec::with_capacity(child_ids.len());
        for child_id in child_ids {
            if depth == 0 {
                children.push(ReplyRef::Id(child_id));
                continue;
            }
            let child = repos.threads().get(&child_id)?;
            match child {
                Some(child) => {
                    let expanded = self.expand(child, depth - 1)?;
                    children.push(ReplyRef::Expanded(Box::new(expanded)));
                }
                None => {
                    tracing::warn!(parent_id = %record.id, child_id = %child_id, "dangling child link");
                    children.push(ReplyRef::Id(child_id));
                }
            }
        }
        Ok(ExpandedThread::from_parts(record, author, children))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorSummary {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
}

impl AuthorSummary {
    fn from_record(record: UserRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            image: record.image,
        }
    }
}

/// A child reference: expanded inline while within the depth bound, a bare
/// id beyond it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplyRef {
    Expanded(Box<ExpandedThread>),
    Id(String),
}

impl ReplyRef {
    pub fn id(&self) -> &str {
        match self {
            ReplyRef::Expanded(thread) => &thread.id,
            ReplyRef::Id(id) => id,
        }
    }

    pub fn as_expanded(&self) -> Option<&ExpandedThread> {
        match self {
            ReplyRef::Expanded(thread) => Some(thread),
            ReplyRef::Id(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandedThread {
    pub id: String,
    pub text: String,
    pub author: AuthorSummary,
    pub parent_id: Option<String>,
    pub community_id: Option<String>,
    pub created_at: String,
    pub children: Vec<ReplyRef>,
}

impl ExpandedThread {
    fn from_parts(record: ThreadRecord, author: AuthorSummary, children: Vec<ReplyRef>) -> Self {
        Self {
            id: record.id,
            text: record.text,
            author,
            parent_id: record.parent_id,
            community_id: record.community_id,
            created_at: record.created_at,
            children,
        }
    }

    pub fn child_ids(&self) -> Vec<&str> {
        self.children.iter().map(ReplyRef::id).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadPage {
    pub items: Vec<ExpandedThread>,
    pub has_next: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePostInput {
    pub text: String,
    pub author_id: String,
    #[serde(default)]
    pub community_id: Option<String>,
    /// Opaque token handed to the invalidation signal after the write.
    #[serde(default)]
    pub invalidation_topic: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comments::{AddCommentInput, CommentLinker};
    use crate::invalidation::{BroadcastSignal, NoopSignal};
    use crate::users::{UpsertUserInput, UserService};
    use std::sync::Arc;

    fn setup() -> (Database, ThreadService, CommentLinker) {
        let db = Database::open_in_memory().expect("db");
        let service = ThreadService::new(db.clone(), Arc::new(NoopSignal));
        let linker = CommentLinker::new(db.clone(), Arc::new(NoopSignal));
        (db, service, linker)
    }

    async fn add_user(db: &Database, id: &str) {
        UserService::new(db.clone())
            .upsert_user(UpsertUserInput {
                id: id.into(),
                name: format!("{id} name"),
                username: id.into(),
                image: Some(format!("https://img.example/{id}.png")),
                onboarded: true,
            })
            .await
            .expect("upsert user");
    }

    fn post(text: &str, author: &str) -> CreatePostInput {
        CreatePostInput {
            text: text.into(),
            author_id: author.into(),
            community_id: None,
            invalidation_topic: "/".into(),
        }
    }

    async fn reply(linker: &CommentLinker, parent: &str, text: &str, author: &str) -> String {
        linker
            .add_comment(AddCommentInput {
                parent_id: parent.into(),
                text: text.into(),
                author_id: author.into(),
                invalidation_topic: format!("/thread/{parent}"),
            })
            .await
            .expect("add comment")
    }

    #[tokio::test]
    async fn create_post_grows_author_index_by_one() {
        let (db, service, _) = setup();
        add_user(&db, "u1").await;

        let before = db
            .with_repositories(|repos| repos.users().authored_thread_ids("u1"))
            .unwrap();
        let id = service.create_post(post("hello", "u1")).await.expect("create");
        let after = db
            .with_repositories(|repos| repos.users().authored_thread_ids("u1"))
            .unwrap();

        assert_eq!(after.len(), before.len() + 1);
        assert!(after.contains(&id));
    }

    #[tokio::test]
    async fn create_post_stores_community_and_signals_topic() {
        let db = Database::open_in_memory().expect("db");
        add_user(&db, "u1").await;
        let signal = BroadcastSignal::new(8);
        let mut topics = signal.subscribe();
        let service = ThreadService::new(db.clone(), Arc::new(signal));

        let id = service
            .create_post(CreatePostInput {
                text: "in a community".into(),
                author_id: "u1".into(),
                community_id: Some("c-rust".into()),
                invalidation_topic: "/communities/c-rust".into(),
            })
            .await
            .expect("create");

        assert_eq!(topics.recv().await.unwrap(), "/communities/c-rust");
        let thread = service.get_by_id(&id).await.expect("fetch");
        assert_eq!(thread.community_id.as_deref(), Some("c-rust"));
        assert!(thread.parent_id.is_none());
    }

    #[tokio::test]
    async fn create_post_rejects_empty_text() {
        let (db, service, _) = setup();
        add_user(&db, "u1").await;
        let err = service.create_post(post("   ", "u1")).await.unwrap_err();
        assert!(matches!(err, ThreadError::Validation(_)));
    }

    #[tokio::test]
    async fn create_post_with_unknown_author_is_a_persistence_error_without_side_effects() {
        let db = Database::open_in_memory().expect("db");
        let signal = BroadcastSignal::new(8);
        let mut topics = signal.subscribe();
        let service = ThreadService::new(db.clone(), Arc::new(signal));

        let err = service.create_post(post("orphan", "ghost")).await.unwrap_err();
        match err {
            ThreadError::Persistence { operation, .. } => assert_eq!(operation, "creating thread"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(db.with_repositories(|repos| repos.threads().count()).unwrap(), 0);
        assert!(topics.try_recv().is_err());
    }

    #[tokio::test]
    async fn listing_excludes_comments_and_sorts_newest_first() {
        let (db, service, linker) = setup();
        add_user(&db, "u1").await;
        let first = service.create_post(post("first", "u1")).await.unwrap();
        let second = service.create_post(post("second", "u1")).await.unwrap();
        reply(&linker, &first, "a reply", "u1").await;

        let page = service.list_top_level(1, 20).await.expect("list");
        let ids: Vec<&str> = page.items.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec![second.as_str(), first.as_str()]);
        assert!(page.items.iter().all(|t| t.parent_id.is_none()));
        assert!(page
            .items
            .windows(2)
            .all(|pair| pair[0].created_at >= pair[1].created_at));
        assert!(!page.has_next);
    }

    #[tokio::test]
    async fn listing_expands_one_level_of_replies() {
        let (db, service, linker) = setup();
        add_user(&db, "u1").await;
        add_user(&db, "u2").await;
        let root = service.create_post(post("root", "u1")).await.unwrap();
        let child = reply(&linker, &root, "child", "u2").await;
        let grandchild = reply(&linker, &child, "grandchild", "u1").await;

        let page = service.list_top_level(1, 20).await.unwrap();
        let item = &page.items[0];
        assert_eq!(item.author.id, "u1");
        let expanded_child = item.children[0].as_expanded().expect("child expanded");
        assert_eq!(expanded_child.author.name, "u2 name");
        assert_eq!(expanded_child.children, vec![ReplyRef::Id(grandchild)]);
    }

    #[tokio::test]
    async fn pagination_reports_has_next() {
        let (db, service, _) = setup();
        add_user(&db, "u1").await;
        for idx in 0..5 {
            service
                .create_post(post(&format!("post {idx}"), "u1"))
                .await
                .unwrap();
        }

        let first = service.list_top_level(1, 2).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert!(first.has_next);

        let last = service.list_top_level(3, 2).await.unwrap();
        assert_eq!(last.items.len(), 1);
        assert!(!last.has_next);

        let beyond = service.list_top_level(4, 2).await.unwrap();
        assert!(beyond.items.is_empty());
        assert!(!beyond.has_next);

        let first_ids: Vec<_> = first.items.iter().map(|t| t.id.clone()).collect();
        let second = service.list_top_level(2, 2).await.unwrap();
        assert!(second.items.iter().all(|t| !first_ids.contains(&t.id)));
    }

    #[tokio::test]
    async fn zero_page_size_returns_empty_page() {
        let (db, service, _) = setup();
        add_user(&db, "u1").await;
        service.create_post(post("only", "u1")).await.unwrap();

        let page = service.list_top_level(1, 0).await.expect("no error");
        assert!(page.items.is_empty());
        assert!(page.has_next);
    }

    #[tokio::test]
    async fn page_number_zero_is_rejected() {
        let (_, service, _) = setup();
        let err = service.list_top_level(0, 10).await.unwrap_err();
        assert!(matches!(err, ThreadError::Validation(_)));
    }

    #[tokio::test]
    async fn detail_expansion_stops_after_two_levels() {
        let (db, service, linker) = setup();
        add_user(&db, "u1").await;
        add_user(&db, "u2").await;
        let root = service.create_post(post("root", "u1")).await.unwrap();
        let level1 = reply(&linker, &root, "level 1", "u2").await;
        let level2 = reply(&linker, &level1, "level 2", "u1").await;
        let level3 = reply(&linker, &level2, "level 3", "u2").await;

        let thread = service.get_by_id(&root).await.expect("fetch");
        assert_eq!(thread.author.id, "u1");

        let first = thread.children[0].as_expanded().expect("level 1 expanded");
        assert_eq!(first.id, level1);
        assert_eq!(first.author.id, "u2");

        let second = first.children[0].as_expanded().expect("level 2 expanded");
        assert_eq!(second.id, level2);
        assert_eq!(second.author.id, "u1");
        assert_eq!(second.children, vec![ReplyRef::Id(level3)]);
    }

    #[tokio::test]
    async fn max_depth_is_configurable() {
        let (db, service, linker) = setup();
        add_user(&db, "u1").await;
        let root = service.create_post(post("root", "u1")).await.unwrap();
        let level1 = reply(&linker, &root, "level 1", "u1").await;
        let level2 = reply(&linker, &level1, "level 2", "u1").await;

        let shallow = service.clone().with_max_depth(1);
        assert_eq!(shallow.max_depth(), 1);
        let thread = shallow.get_by_id(&root).await.unwrap();
        let first = thread.children[0].as_expanded().unwrap();
        assert_eq!(first.children, vec![ReplyRef::Id(level2)]);

        let flat = service.get_by_id_with_depth(&root, 0).await.unwrap();
        assert_eq!(flat.children, vec![ReplyRef::Id(level1)]);
    }

    #[tokio::test]
    async fn expansion_depth_is_capped() {
        let (db, service, linker) = setup();
        add_user(&db, "u1").await;
        let root = service.create_post(post("root", "u1")).await.unwrap();
        let mut chain = vec![root.clone()];
        for level in 1..=MAX_EXPANSION_DEPTH + 3 {
            let parent = chain[chain.len() - 1].clone();
            chain.push(reply(&linker, &parent, &format!("level {level}"), "u1").await);
        }

        let err = service
            .get_by_id_with_depth(&root, usize::MAX)
            .await
            .unwrap_err();
        assert!(matches!(err, ThreadError::Validation(_)));
        let err = service
            .get_by_id_with_depth(&root, MAX_EXPANSION_DEPTH + 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ThreadError::Validation(_)));

        let mut node = service
            .get_by_id_with_depth(&root, MAX_EXPANSION_DEPTH)
            .await
            .expect("deepest allowed read");
        for _ in 0..MAX_EXPANSION_DEPTH {
            node = node.children[0].as_expanded().expect("within bound").clone();
        }
        assert_eq!(node.id, chain[MAX_EXPANSION_DEPTH]);
        assert_eq!(
            node.children,
            vec![ReplyRef::Id(chain[MAX_EXPANSION_DEPTH + 1].clone())]
        );

        assert_eq!(service.with_max_depth(10_000).max_depth(), MAX_EXPANSION_DEPTH);
    }

    #[tokio::test]
    async fn pages_beyond_any_offset_are_empty() {
        let (db, service, _) = setup();
        add_user(&db, "u1").await;
        for idx in 0..3 {
            service
                .create_post(post(&format!("post {idx}"), "u1"))
                .await
                .unwrap();
        }

        for page_number in [i64::MAX as usize, usize::MAX] {
            let page = service.list_top_level(page_number, 2).await.expect("no error");
            assert!(page.items.is_empty(), "page {page_number} returned items");
            assert!(!page.has_next);
        }

        let all = service.list_top_level(1, usize::MAX).await.expect("unbounded page");
        assert_eq!(all.items.len(), 3);
        assert!(!all.has_next);
    }

    #[tokio::test]
    async fn created_at_advances_even_when_clock_lags() {
        let (db, service, linker) = setup();
        add_user(&db, "u1").await;
        let future = "2999-01-01T00:00:00.000000Z";
        db.with_repositories(|repos| {
            repos.threads().create(&ThreadRecord {
                id: "from-the-future".into(),
                text: "ahead of the clock".into(),
                author_id: "u1".into(),
                parent_id: None,
                community_id: None,
                created_at: future.into(),
            })
        })
        .unwrap();

        let newer = service.create_post(post("written later", "u1")).await.unwrap();
        let comment = reply(&linker, &newer, "and a reply", "u1").await;

        let fetched = service.get_by_id(&newer).await.unwrap();
        assert_eq!(fetched.created_at, "2999-01-01T00:00:00.000001Z");
        let fetched_comment = service.get_by_id(&comment).await.unwrap();
        assert!(fetched_comment.created_at > fetched.created_at);

        let page = service.list_top_level(1, 10).await.unwrap();
        let ids: Vec<&str> = page.items.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec![newer.as_str(), "from-the-future"]);
    }

    #[tokio::test]
    async fn repeated_reads_are_identical() {
        let (db, service, linker) = setup();
        add_user(&db, "u1").await;
        let root = service.create_post(post("root", "u1")).await.unwrap();
        reply(&linker, &root, "one", "u1").await;
        reply(&linker, &root, "two", "u1").await;

        let first = service.get_by_id(&root).await.unwrap();
        let second = service.get_by_id(&root).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn unknown_thread_is_not_found() {
        let (_, service, _) = setup();
        let err = service.get_by_id("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn closed_store_surfaces_persistence_error() {
        let (db, service, _) = setup();
        db.close().unwrap();
        let err = service.list_top_level(1, 10).await.unwrap_err();
        assert!(matches!(err, ThreadError::Persistence { operation: "fetching posts", .. }));
    }
}
