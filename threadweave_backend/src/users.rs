use crate::database::models::UserRecord;
use crate::database::repositories::UserRepository;
use crate::database::Database;
use crate::error::{PersistenceContext, ThreadError, ThreadResult};
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct UserService {
    database: Database,
}

impl UserService {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub async fn upsert_user(&self, input: UpsertUserInput) -> ThreadResult<UserView> {
        for (field, value) in [
            ("id", &input.id),
            ("name", &input.name),
            ("username", &input.username),
        ] {
            if value.trim().is_empty() {
                return Err(ThreadError::validation(format!("user {field} may not be empty")));
            }
        }
        let record = UserRecord {
            id: input.id,
            name: input.name,
            username: input.username.trim().to_lowercase(),
            image: input.image.filter(|image| !image.trim().is_empty()),
            onboarded: input.onboarded,
        };

        let view = self
            .database
            .call(move |repos| {
                let users = repos.users();
                users.upsert(&record)?;
                let threads = users.authored_thread_ids(&record.id)?;
                Ok(UserView::from_record(record, threads))
            })
            .await
            .during("saving user")?;
        tracing::info!(user_id = %view.id, username = %view.username, "saved user");
        Ok(view)
    }

    pub async fn get_user(&self, id: &str) -> ThreadResult<UserView> {
        let lookup = id.to_string();
        let view = self
            .database
            .call(move |repos| {
                let users = repos.users();
                let Some(record) = users.get(&lookup)? else {
                    return Ok(None);
                };
                let threads = users.authored_thread_ids(&lookup)?;
                Ok(Some(UserView::from_record(record, threads)))
            })
            .await
            .during("fetching user")?;
        view.ok_or_else(|| ThreadError::user_not_found(id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertUserInput {
    pub id: String,
    pub name: String,
    pub username: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub onboarded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub username: String,
    pub image: Option<String>,
    pub onboarded: bool,
    /// Authored top-level post ids.
    pub threads: Vec<String>,
}

impl UserView {
    fn from_record(record: UserRecord, threads: Vec<String>) -> Self {
        Self {
            id: record.id,
            name: record.name,
            username: record.username,
            image: record.image,
            onboarded: record.onboarded,
            threads,
        }
    }
}
