//! Persistence interfaces and records.
//!
//! The business layer depends only on [`UserStore`] and [`PostStore`]; the
//! in-memory [`MemoryStore`] implements both.

mod memory;

pub use memory::MemoryStore;

use chrono::{DateTime, Utc};
use miniblog_core::proto::{Post, User};

/// Timestamp layout used in API responses.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique key is already taken.
    #[error("duplicate entry for key `{0}`")]
    Duplicate(&'static str),

    #[error("record not found")]
    NotFound,
}

#[derive(Clone, Debug)]
pub struct UserRecord {
    pub user_id: String,
    pub username: String,
    pub password_hash: String,
    pub nickname: String,
    pub email: String,
    pub phone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn to_proto(&self, post_count: i64) -> User {
        User {
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            nickname: self.nickname.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            post_count,
            created_at: self.created_at.format(TIME_FORMAT).to_string(),
            updated_at: self.updated_at.format(TIME_FORMAT).to_string(),
        }
    }
}

/// Fields supplied when creating a user; the store assigns the ID and
/// timestamps.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub nickname: String,
    pub email: String,
    pub phone: String,
}

#[derive(Clone, Debug)]
pub struct PostRecord {
    pub post_id: String,
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PostRecord {
    pub fn to_proto(&self) -> Post {
        Post {
            post_id: self.post_id.clone(),
            user_id: self.user_id.clone(),
            title: self.title.clone(),
            content: self.content.clone(),
            created_at: self.created_at.format(TIME_FORMAT).to_string(),
            updated_at: self.updated_at.format(TIME_FORMAT).to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NewPost {
    pub user_id: String,
    pub title: String,
    pub content: String,
}

/// One page of a listing plus the total number of matching records.
#[derive(Clone, Debug)]
pub struct Page<T> {
    pub total: i64,
    pub items: Vec<T>,
}

#[tonic::async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts a user, failing with [`StoreError::Duplicate`] on a taken
    /// username.
    async fn create(&self, user: NewUser) -> Result<UserRecord, StoreError>;
    async fn get(&self, user_id: &str) -> Result<UserRecord, StoreError>;
    async fn get_by_username(&self, username: &str) -> Result<UserRecord, StoreError>;
    /// Replaces a stored user and refreshes `updated_at`.
    async fn update(&self, user: UserRecord) -> Result<UserRecord, StoreError>;
    /// Removes a user. Deleting an absent user is not an error.
    async fn delete(&self, user_id: &str) -> Result<(), StoreError>;
    async fn list(&self, offset: usize, limit: usize) -> Result<Page<UserRecord>, StoreError>;
}

#[tonic::async_trait]
pub trait PostStore: Send + Sync {
    async fn create(&self, post: NewPost) -> Result<PostRecord, StoreError>;
    /// Fetches a post owned by `user_id`.
    async fn get(&self, user_id: &str, post_id: &str) -> Result<PostRecord, StoreError>;
    async fn update(&self, post: PostRecord) -> Result<PostRecord, StoreError>;
    /// Removes the listed posts owned by `user_id`, skipping absent ones.
    async fn delete(&self, user_id: &str, post_ids: &[String]) -> Result<(), StoreError>;
    async fn delete_by_user(&self, user_id: &str) -> Result<(), StoreError>;
    async fn count_by_user(&self, user_id: &str) -> Result<i64, StoreError>;
    /// Lists posts owned by `user_id`, optionally filtered by a title
    /// substring.
    async fn list(
        &self,
        user_id: &str,
        title: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<Page<PostRecord>, StoreError>;
}
