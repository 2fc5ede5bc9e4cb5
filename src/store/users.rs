use async_trait::async_trait;
use rusqlite::{params, ErrorCode, OptionalExtension, TransactionBehavior};
use std::sync::Arc;

use crate::auth::session;
use crate::db::models::User;
use crate::db::USERS_SCHEMA;
use crate::moderation::ModerationPolicy;
use crate::state::DbPool;
use crate::store::kv::{self, keys, KvStore};
use crate::store::{StoreError, UserRepository};
use crate::validation::{self, Rejection};

/// SQLite implementation. The row is the source of truth for bio and
/// profile image; the `bio_*` and `profileImage_*` key-value entries are
/// written in the same transaction as the row and read first.
pub struct SqliteUserRepository {
    pool: DbPool,
    kv: KvStore,
    moderation: Arc<ModerationPolicy>,
}

impl SqliteUserRepository {
    pub fn new(pool: DbPool, moderation: Arc<ModerationPolicy>) -> Self {
        Self {
            kv: KvStore::new(pool.clone()),
            pool,
            moderation,
        }
    }

    fn column(&self, username: &str, column: &str) -> Result<Option<String>, StoreError> {
        let conn = self.pool.get()?;
        let value: Option<Option<String>> = conn
            .query_row(
                &format!("SELECT {column} FROM users WHERE username = ?1"),
                params![username],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.flatten())
    }

    /// Read through a cache key, repopulating it from the row on a miss.
    /// The lease is taken before the row is read, so a write that lands
    /// in between wins over the rebuilt value.
    fn cached_column(
        &self,
        username: &str,
        column: &str,
        key: &str,
    ) -> Result<Option<String>, StoreError> {
        if let Some(value) = self.kv.get(key)? {
            return Ok(Some(value));
        }

        let lease = self.kv.lease(key)?;
        let value = self.column(username, column)?;
        if let Some(lease) = lease {
            match value {
                Some(ref v) => {
                    self.kv.fill(key, &lease, v)?;
                }
                None => self.kv.release(key, &lease)?,
            }
        }
        Ok(value)
    }

    /// Update the row and its cache entry in one transaction.
    fn write_through(
        &self,
        username: &str,
        column: &str,
        key: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let rows = tx.execute(
            &format!("UPDATE users SET {column} = ?1 WHERE username = ?2"),
            params![value, username],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("user {username}")));
        }
        kv::upsert(&tx, key, value)?;
        tx.commit()?;
        Ok(())
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn initialize(&self) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        conn.execute_batch(USERS_SCHEMA)?;
        Ok(())
    }

    async fn create(&self, username: &str, password: &str) -> Result<i64, StoreError> {
        validation::validate_signup(&self.moderation, username, password)?;

        if self.find_by_username(username).await?.is_some() {
            return Err(Rejection::UsernameTaken.into());
        }

        let conn = self.pool.get()?;
        let result = conn.execute(
            "INSERT INTO users (username, password) VALUES (?1, ?2)",
            params![username, password],
        );

        match result {
            Ok(_) => {
                let id = conn.last_insert_rowid();
                tracing::info!(user_id = id, username = %username, "user created");
                Ok(id)
            }
            // A concurrent signup won the race between the check and the insert
            Err(e) if is_unique_violation(&e) => Err(Rejection::UsernameTaken.into()),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                "SELECT id, username, password, profile_image, bio, created_at
                 FROM users WHERE username = ?1",
                params![username],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        password: row.get(2)?,
                        profile_image: row.get(3)?,
                        bio: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    async fn update_bio(&self, username: &str, bio: &str) -> Result<(), StoreError> {
        validation::validate_bio(bio)?;
        self.write_through(username, "bio", &keys::bio(username), bio)?;
        tracing::info!(username = %username, "bio updated");
        Ok(())
    }

    async fn get_bio(&self, username: &str) -> Result<Option<String>, StoreError> {
        self.cached_column(username, "bio", &keys::bio(username))
    }

    async fn get_profile_image(&self, username: &str) -> Result<Option<String>, StoreError> {
        self.cached_column(username, "profile_image", &keys::profile_image(username))
    }

    async fn set_profile_image(&self, username: &str, uri: &str) -> Result<(), StoreError> {
        self.write_through(username, "profile_image", &keys::profile_image(username), uri)?;
        tracing::info!(username = %username, "profile image updated");
        Ok(())
    }

    async fn list_usernames(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT username FROM users ORDER BY id")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    async fn delete_all_users(&self) -> Result<u64, StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let rows = tx.execute("DELETE FROM users", [])?;
        session::delete_all_sessions(&tx)?;
        tx.commit()?;
        tracing::info!(count = rows, "all users deleted");

        // Best effort: the relational delete stands even if cleanup fails
        for prefix in [keys::PROFILE_IMAGE_PREFIX, keys::BIO_PREFIX, keys::POSTS_PREFIX] {
            if let Err(e) = kv::delete_prefix(&conn, prefix) {
                tracing::warn!(prefix = %prefix, error = %e, "failed to remove cache entries");
            }
        }
        for key in [keys::LOGGED_IN_USER, keys::USER_ID] {
            if let Err(e) = kv::delete(&conn, key) {
                tracing::warn!(key = %key, error = %e, "failed to remove cache entry");
            }
        }

        Ok(rows as u64)
    }
}
