use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;

use crate::db::models::{Post, PostDraft};
use crate::db::POSTS_SCHEMA;
use crate::media::DynMediaRelocator;
use crate::moderation::ModerationPolicy;
use crate::state::DbPool;
use crate::store::kv::{self, keys};
use crate::store::{PostRepository, StoreError};
use crate::validation::{self, Rejection};

const POST_COLUMNS: &str = "id, image, description, username, created_at";

/// SQLite implementation. Every write also invalidates the author's
/// `posts_<username>` cache entry inside the same transaction. Drafts
/// without an image are stored as text posts and touch no media.
pub struct SqlitePostRepository {
    pool: DbPool,
    media: DynMediaRelocator,
    moderation: Arc<ModerationPolicy>,
}

impl SqlitePostRepository {
    pub fn new(pool: DbPool, media: DynMediaRelocator, moderation: Arc<ModerationPolicy>) -> Self {
        Self {
            pool,
            media,
            moderation,
        }
    }

    fn author_exists(&self, username: &str) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;
        let exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM users WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn insert(&self, image: Option<&str>, draft: &PostDraft) -> Result<i64, StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO posts (image, description, username) VALUES (?1, ?2, ?3)",
            params![image, draft.description, draft.username],
        )?;
        let id = tx.last_insert_rowid();
        kv::delete(&tx, &keys::posts(&draft.username))?;
        tx.commit()?;
        Ok(id)
    }
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        image: row.get(1)?,
        description: row.get(2)?,
        username: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[async_trait]
impl PostRepository for SqlitePostRepository {
    async fn initialize(&self) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        conn.execute_batch(POSTS_SCHEMA)?;
        Ok(())
    }

    async fn create(&self, draft: PostDraft) -> Result<i64, StoreError> {
        match draft.image {
            Some(_) => validation::validate_description(&self.moderation, &draft.description)?,
            None => validation::validate_text_post(&self.moderation, &draft.description)?,
        }
        if !self.author_exists(&draft.username)? {
            return Err(Rejection::UnknownAuthor(draft.username.clone()).into());
        }

        let Some(staged) = draft.image.as_deref() else {
            let id = self.insert(None, &draft)?;
            tracing::info!(post_id = id, username = %draft.username, "text post created");
            return Ok(id);
        };

        let durable = self.media.relocate(Path::new(staged)).await?;
        let image = durable.to_string_lossy().into_owned();

        match self.insert(Some(image.as_str()), &draft) {
            Ok(id) => {
                tracing::info!(post_id = id, username = %draft.username, "post created");
                Ok(id)
            }
            Err(e) => {
                // Leave no orphaned file behind a failed insert
                if let Err(cleanup) = self.media.remove(&durable).await {
                    tracing::warn!(
                        path = %durable.display(),
                        error = %cleanup,
                        "failed to remove media after insert failure"
                    );
                }
                Err(e)
            }
        }
    }

    async fn get(&self, id: i64) -> Result<Option<Post>, StoreError> {
        let conn = self.pool.get()?;
        let post = conn
            .query_row(
                &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
                params![id],
                post_from_row,
            )
            .optional()?;
        Ok(post)
    }

    async fn list_all(&self) -> Result<Vec<Post>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!("SELECT {POST_COLUMNS} FROM posts"))?;
        let posts = stmt
            .query_map([], post_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    async fn list_page(&self, page: i64, page_size: i64) -> Result<Vec<Post>, StoreError> {
        let offset = validation::page_offset(page, page_size).map_err(StoreError::InvalidArgument)?;

        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {POST_COLUMNS} FROM posts ORDER BY id DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let posts = stmt
            .query_map(params![page_size, offset], post_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    async fn list_by_username(&self, username: &str) -> Result<Vec<Post>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE username = ?1 ORDER BY id DESC"
        ))?;
        let posts = stmt
            .query_map(params![username], post_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    async fn delete_by_id(&self, id: i64) -> Result<bool, StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let owner: Option<String> = tx
            .query_row(
                "SELECT username FROM posts WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(owner) = owner else {
            return Ok(false);
        };

        tx.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
        kv::delete(&tx, &keys::posts(&owner))?;
        tx.commit()?;

        tracing::info!(post_id = id, username = %owner, "post deleted");
        Ok(true)
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let rows = tx.execute("DELETE FROM posts", [])?;
        kv::delete_prefix(&tx, keys::POSTS_PREFIX)?;
        tx.commit()?;

        tracing::info!(count = rows, "all posts deleted");
        Ok(rows as u64)
    }
}
