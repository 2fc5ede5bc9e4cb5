// Repository pattern - isolates all storage side effects
pub mod kv;
pub mod posts;
pub mod remote;
pub mod users;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::db::models::{Post, PostDraft, User};
use crate::media::MediaError;
use crate::validation::Rejection;

pub use self::kv::KvStore;
pub use self::posts::SqlitePostRepository;
pub use self::remote::{MemoryDocumentStore, RemoteBackend};
pub use self::users::SqliteUserRepository;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Media move failed: {0}")]
    MediaMoveFailed(#[from] MediaError),

    #[error("{0}")]
    Rejected(#[from] Rejection),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Image posts.
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Ensure the backing table exists (idempotent)
    async fn initialize(&self) -> Result<(), StoreError>;

    /// Relocate the draft's media, then record the post. Returns the new id.
    async fn create(&self, draft: PostDraft) -> Result<i64, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<Post>, StoreError>;

    /// Every post, in no particular order
    async fn list_all(&self) -> Result<Vec<Post>, StoreError>;

    /// Posts ordered by id descending; `page` is 1-based
    async fn list_page(&self, page: i64, page_size: i64) -> Result<Vec<Post>, StoreError>;

    async fn list_by_username(&self, username: &str) -> Result<Vec<Post>, StoreError>;

    /// Returns whether a row was removed. The caller removes the media.
    async fn delete_by_id(&self, id: i64) -> Result<bool, StoreError>;

    async fn delete_all(&self) -> Result<u64, StoreError>;
}

/// Accounts and profile fields.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn initialize(&self) -> Result<(), StoreError>;

    /// Validate and insert a new account. Returns the new id.
    async fn create(&self, username: &str, password: &str) -> Result<i64, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn update_bio(&self, username: &str, bio: &str) -> Result<(), StoreError>;

    async fn get_bio(&self, username: &str) -> Result<Option<String>, StoreError>;

    async fn get_profile_image(&self, username: &str) -> Result<Option<String>, StoreError>;

    async fn set_profile_image(&self, username: &str, uri: &str) -> Result<(), StoreError>;

    async fn list_usernames(&self) -> Result<Vec<String>, StoreError>;

    /// Delete every account. Returns the number of accounts removed.
    async fn delete_all_users(&self) -> Result<u64, StoreError>;
}

pub type DynPostRepository = Arc<dyn PostRepository>;
pub type DynUserRepository = Arc<dyn UserRepository>;
