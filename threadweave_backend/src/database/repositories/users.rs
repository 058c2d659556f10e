use crate::database::models::UserRecord;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

pub(super) struct SqliteUserRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

impl<'conn> super::UserRepository for SqliteUserRepository<'conn> {
    fn upsert(&self, record: &UserRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO users (id, name, username, image, onboarded)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                username = excluded.username,
                image = excluded.image,
                onboarded = excluded.onboarded
            "#,
            params![
                record.id,
                record.name,
                record.username,
                record.image,
                if record.onboarded { 1 } else { 0 }
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<UserRecord>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT id, name, username, image, onboarded
                FROM users
                WHERE id = ?1
                "#,
                params![id],
                |row| {
                    Ok(UserRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        username: row.get(2)?,
                        image: row.get(3)?,
                        onboarded: row.get::<_, i64>(4)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    fn add_authored_thread(&self, user_id: &str, thread_id: &str) -> Result<bool> {
        let inserted = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO user_threads (user_id, thread_id)
            VALUES (?1, ?2)
            "#,
            params![user_id, thread_id],
        )?;
        Ok(inserted > 0)
    }

    fn authored_thread_ids(&self, user_id: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT thread_id
            FROM user_threads
            WHERE user_id = ?1
            ORDER BY thread_id ASC
            "#,
        )?;
        let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }
}
