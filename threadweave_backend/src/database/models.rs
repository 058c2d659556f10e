use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub username: String,
    pub image: Option<String>,
    pub onboarded: bool,
}

/// A content node. Top-level post when `parent_id` is `None`, comment otherwise.
///
/// Child links live in `thread_children` and are never embedded here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub id: String,
    pub text: String,
    pub author_id: String,
    pub parent_id: Option<String>,
    pub community_id: Option<String>,
    pub created_at: String,
}
