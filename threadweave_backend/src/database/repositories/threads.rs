use crate::database::models::ThreadRecord;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

pub(super) struct SqliteThreadRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

const THREAD_COLUMNS: &str = "id, text, author_id, parent_id, community_id, created_at";

fn map_thread(row: &Row<'_>) -> rusqlite::Result<ThreadRecord> {
    Ok(ThreadRecord {
        id: row.get(0)?,
        text: row.get(1)?,
        author_id: row.get(2)?,
        parent_id: row.get(3)?,
        community_id: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl<'conn> SqliteThreadRepository<'conn> {
    fn collect(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<ThreadRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, map_thread)?;
        let mut threads = Vec::new();
        for row in rows {
            threads.push(row?);
        }
        Ok(threads)
    }
}

impl<'conn> super::ThreadRepository for SqliteThreadRepository<'conn> {
    fn create(&self, record: &ThreadRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO threads (id, text, author_id, parent_id, community_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.id,
                record.text,
                record.author_id,
                record.parent_id,
                record.community_id,
                record.created_at
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<ThreadRecord>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {THREAD_COLUMNS} FROM threads WHERE id = ?1"),
                params![id],
                map_thread,
            )
            .optional()?;
        Ok(row)
    }

    fn append_child(&self, parent_id: &str, child_id: &str) -> Result<bool> {
        // Position is computed inside the insert itself, so concurrent
        // appends to the same parent never read a stale child list.
        let inserted = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO thread_children (parent_id, child_id, position)
            SELECT ?1, ?2, COALESCE(MAX(position), -1) + 1
            FROM thread_children
            WHERE parent_id = ?1
            "#,
            params![parent_id, child_id],
        )?;
        Ok(inserted > 0)
    }

    fn children_of(&self, parent_id: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT child_id
            FROM thread_children
            WHERE parent_id = ?1
            ORDER BY position ASC
            "#,
        )?;
        let rows = stmt.query_map(params![parent_id], |row| row.get::<_, String>(0))?;
        let mut children = Vec::new();
        for row in rows {
            children.push(row?);
        }
        Ok(children)
    }

    fn list_top_level(&self, skip: usize, limit: usize) -> Result<Vec<ThreadRecord>> {
        let offset = i64::try_from(skip).with_context(|| format!("offset {skip} out of range"))?;
        // SQLite reads any negative LIMIT as unbounded.
        let limit = i64::try_from(limit).unwrap_or(-1);
        self.collect(
            &format!(
                r#"
                SELECT {THREAD_COLUMNS}
                FROM threads
                WHERE parent_id IS NULL
                ORDER BY created_at DESC, rowid DESC
                LIMIT ?1 OFFSET ?2
                "#
            ),
            params![limit, offset],
        )
    }

    fn count_top_level(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM threads WHERE parent_id IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM threads", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn latest_created_at(&self) -> Result<Option<String>> {
        let latest: Option<String> =
            self.conn
                .query_row("SELECT MAX(created_at) FROM threads", [], |row| row.get(0))?;
        Ok(latest)
    }

    fn list_authored(&self, user_id: &str) -> Result<Vec<ThreadRecord>> {
        self.collect(
            r#"
            SELECT t.id, t.text, t.author_id, t.parent_id, t.community_id, t.created_at
            FROM threads t
            INNER JOIN user_threads u ON u.thread_id = t.id
            WHERE u.user_id = ?1
            ORDER BY t.created_at DESC, t.rowid DESC
            "#,
            params![user_id],
        )
    }

    fn unlinked_replies(&self) -> Result<Vec<ThreadRecord>> {
        self.collect(
            r#"
            SELECT t.id, t.text, t.author_id, t.parent_id, t.community_id, t.created_at
            FROM threads t
            WHERE t.parent_id IS NOT NULL
              AND NOT EXISTS (
                  SELECT 1 FROM thread_children c
                  WHERE c.parent_id = t.parent_id AND c.child_id = t.id
              )
            ORDER BY t.created_at ASC, t.rowid ASC
            "#,
            params![],
        )
    }
}
