//! Document-store backend for the same repository contracts.
//!
//! Accounts are keyed by a synthesized e-mail address
//! (`<username>@<domain>`), profiles live at `users/<username>` and each
//! user's posts form a `users/<username>/posts` subcollection. The
//! [`DocumentStore`] seam lets a hosted document database stand in for
//! [`MemoryDocumentStore`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::db::models::{Post, PostDraft, User};
use crate::moderation::ModerationPolicy;
use crate::store::{PostRepository, StoreError, UserRepository};
use crate::validation::{self, Rejection};

pub type Document = Map<String, Value>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<Document>, StoreError>;

    /// Write a document. With `merge`, fields are merged into an existing one.
    async fn set(&self, path: &str, doc: Document, merge: bool) -> Result<(), StoreError>;

    async fn delete(&self, path: &str) -> Result<bool, StoreError>;

    /// Direct children of a collection as `(path, document)` pairs.
    async fn list(&self, collection: &str) -> Result<Vec<(String, Document)>, StoreError>;

    /// Every document in any collection named `collection_id`.
    async fn list_group(&self, collection_id: &str) -> Result<Vec<(String, Document)>, StoreError>;

    /// Atomically add one to an integer field, creating the document or
    /// field at zero first. Returns the new value.
    async fn increment(&self, path: &str, field: &str) -> Result<i64, StoreError>;
}

/// In-process document store.
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: RwLock<BTreeMap<String, Document>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.docs.read().await.get(path).cloned())
    }

    async fn set(&self, path: &str, doc: Document, merge: bool) -> Result<(), StoreError> {
        let mut docs = self.docs.write().await;
        if merge {
            if let Some(existing) = docs.get_mut(path) {
                existing.extend(doc);
                return Ok(());
            }
        }
        docs.insert(path.to_string(), doc);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<bool, StoreError> {
        Ok(self.docs.write().await.remove(path).is_some())
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Document)>, StoreError> {
        let prefix = format!("{collection}/");
        let docs = self.docs.read().await;
        Ok(docs
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter(|(path, _)| !path[prefix.len()..].contains('/'))
            .map(|(path, doc)| (path.clone(), doc.clone()))
            .collect())
    }

    async fn list_group(&self, collection_id: &str) -> Result<Vec<(String, Document)>, StoreError> {
        let docs = self.docs.read().await;
        Ok(docs
            .iter()
            .filter(|(path, _)| {
                let segments: Vec<&str> = path.split('/').collect();
                segments.len() >= 2 && segments[segments.len() - 2] == collection_id
            })
            .map(|(path, doc)| (path.clone(), doc.clone()))
            .collect())
    }

    async fn increment(&self, path: &str, field: &str) -> Result<i64, StoreError> {
        let mut docs = self.docs.write().await;
        let doc = docs.entry(path.to_string()).or_default();
        let next = doc.get(field).and_then(Value::as_i64).unwrap_or(0) + 1;
        doc.insert(field.to_string(), json!(next));
        Ok(next)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AccountDoc {
    uid: String,
    username: String,
    password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserDoc {
    id: i64,
    username: String,
    #[serde(default)]
    bio: String,
    #[serde(default)]
    profile_image_url: String,
    created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct PostDoc {
    id: i64,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    username: String,
    timestamp: String,
}

impl From<PostDoc> for Post {
    fn from(doc: PostDoc) -> Self {
        Post {
            id: doc.id,
            image: doc.image,
            description: doc.content,
            username: doc.username,
            created_at: doc.timestamp,
        }
    }
}

fn to_document<T: Serialize>(value: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::InvalidArgument(format!(
            "documents must be objects, got {other}"
        ))),
    }
}

fn from_document<T: for<'de> Deserialize<'de>>(doc: Document) -> Result<T, StoreError> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Ids are drawn from counter documents under `counters/`, so every
/// backend sharing a document store hands out distinct ids.
pub struct RemoteBackend {
    docs: Arc<dyn DocumentStore>,
    moderation: Arc<ModerationPolicy>,
    email_domain: String,
}

impl RemoteBackend {
    pub fn new(docs: Arc<dyn DocumentStore>, moderation: Arc<ModerationPolicy>) -> Self {
        Self {
            docs,
            moderation,
            email_domain: "example.com".to_string(),
        }
    }

    pub fn with_email_domain(mut self, domain: impl Into<String>) -> Self {
        self.email_domain = domain.into();
        self
    }

    /// The identity the auth provider knows a username by.
    pub fn synthesize_email(&self, username: &str) -> String {
        format!("{}@{}", username, self.email_domain)
    }

    fn account_path(&self, username: &str) -> String {
        format!("accounts/{}", self.synthesize_email(username))
    }

    fn user_path(username: &str) -> String {
        format!("users/{username}")
    }

    fn posts_collection(username: &str) -> String {
        format!("users/{username}/posts")
    }

    async fn next_id(&self, counter: &str) -> Result<i64, StoreError> {
        self.docs
            .increment(&format!("counters/{counter}"), "last")
            .await
    }

    /// Register credentials and a profile document. Returns the account uid.
    pub async fn sign_up(&self, username: &str, password: &str) -> Result<String, StoreError> {
        self.register(username, password).await.map(|(_, uid)| uid)
    }

    /// Verify credentials. `None` when the account is unknown or the
    /// password does not match.
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<Option<String>, StoreError> {
        let Some(doc) = self.docs.get(&self.account_path(username)).await? else {
            return Ok(None);
        };
        let account: AccountDoc = from_document(doc)?;
        if account.password == password {
            Ok(Some(account.uid))
        } else {
            Ok(None)
        }
    }

    async fn register(&self, username: &str, password: &str) -> Result<(i64, String), StoreError> {
        validation::validate_signup(&self.moderation, username, password)?;

        let account_path = self.account_path(username);
        if self.docs.get(&account_path).await?.is_some() {
            return Err(Rejection::UsernameTaken.into());
        }

        let uid = uuid::Uuid::now_v7().to_string();
        let id = self.next_id("users").await?;

        let account = AccountDoc {
            uid: uid.clone(),
            username: username.to_string(),
            password: password.to_string(),
        };
        self.docs
            .set(&account_path, to_document(&account)?, false)
            .await?;

        let profile = UserDoc {
            id,
            username: username.to_string(),
            bio: String::new(),
            profile_image_url: String::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.docs
            .set(&Self::user_path(username), to_document(&profile)?, false)
            .await?;

        tracing::info!(user_id = id, username = %username, "remote user created");
        Ok((id, uid))
    }

    async fn user_doc(&self, username: &str) -> Result<Option<UserDoc>, StoreError> {
        match self.docs.get(&Self::user_path(username)).await? {
            Some(doc) => Ok(Some(from_document(doc)?)),
            None => Ok(None),
        }
    }

    async fn merge_user_field(&self, username: &str, field: &str, value: &str) -> Result<(), StoreError> {
        if self.user_doc(username).await?.is_none() {
            return Err(StoreError::NotFound(format!("user {username}")));
        }
        let mut patch = Document::new();
        patch.insert(field.to_string(), json!(value));
        self.docs.set(&Self::user_path(username), patch, true).await
    }

    async fn all_posts(&self) -> Result<Vec<(String, Post)>, StoreError> {
        self.docs
            .list_group("posts")
            .await?
            .into_iter()
            .map(|(path, doc)| Ok((path, from_document::<PostDoc>(doc)?.into())))
            .collect()
    }
}

#[async_trait]
impl UserRepository for RemoteBackend {
    async fn initialize(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create(&self, username: &str, password: &str) -> Result<i64, StoreError> {
        self.register(username, password).await.map(|(id, _)| id)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let Some(profile) = self.user_doc(username).await? else {
            return Ok(None);
        };
        let password = match self.docs.get(&self.account_path(username)).await? {
            Some(doc) => from_document::<AccountDoc>(doc)?.password,
            None => String::new(),
        };

        Ok(Some(User {
            id: profile.id,
            username: profile.username,
            password,
            profile_image: non_empty(profile.profile_image_url),
            bio: non_empty(profile.bio),
            created_at: profile.created_at,
        }))
    }

    async fn update_bio(&self, username: &str, bio: &str) -> Result<(), StoreError> {
        validation::validate_bio(bio)?;
        self.merge_user_field(username, "bio", bio).await
    }

    async fn get_bio(&self, username: &str) -> Result<Option<String>, StoreError> {
        Ok(self.user_doc(username).await?.and_then(|u| non_empty(u.bio)))
    }

    async fn get_profile_image(&self, username: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .user_doc(username)
            .await?
            .and_then(|u| non_empty(u.profile_image_url)))
    }

    async fn set_profile_image(&self, username: &str, uri: &str) -> Result<(), StoreError> {
        self.merge_user_field(username, "profileImageUrl", uri).await
    }

    async fn list_usernames(&self) -> Result<Vec<String>, StoreError> {
        let mut users: Vec<UserDoc> = self
            .docs
            .list("users")
            .await?
            .into_iter()
            .map(|(_, doc)| from_document(doc))
            .collect::<Result<_, _>>()?;
        users.sort_by_key(|u| u.id);
        Ok(users.into_iter().map(|u| u.username).collect())
    }

    async fn delete_all_users(&self) -> Result<u64, StoreError> {
        let usernames = self.list_usernames().await?;
        let mut deleted = 0u64;
        for username in &usernames {
            if self.docs.delete(&Self::user_path(username)).await? {
                deleted += 1;
            }
            self.docs.delete(&self.account_path(username)).await?;
        }
        tracing::info!(count = deleted, "all remote users deleted");
        Ok(deleted)
    }
}

#[async_trait]
impl PostRepository for RemoteBackend {
    async fn initialize(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// The draft's image is stored as given: remote posts reference
    /// already-uploaded media by URL. Text posts store no image field.
    async fn create(&self, draft: PostDraft) -> Result<i64, StoreError> {
        match draft.image {
            Some(_) => validation::validate_description(&self.moderation, &draft.description)?,
            None => validation::validate_text_post(&self.moderation, &draft.description)?,
        }
        if self.user_doc(&draft.username).await?.is_none() {
            return Err(Rejection::UnknownAuthor(draft.username).into());
        }

        let id = self.next_id("posts").await?;
        let doc = PostDoc {
            id,
            content: draft.description,
            image: draft.image,
            username: draft.username.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let path = format!("{}/{}", Self::posts_collection(&draft.username), id);
        self.docs.set(&path, to_document(&doc)?, false).await?;

        tracing::info!(post_id = id, username = %draft.username, "remote post created");
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Option<Post>, StoreError> {
        Ok(self
            .all_posts()
            .await?
            .into_iter()
            .map(|(_, post)| post)
            .find(|post| post.id == id))
    }

    async fn list_all(&self) -> Result<Vec<Post>, StoreError> {
        Ok(self.all_posts().await?.into_iter().map(|(_, p)| p).collect())
    }

    async fn list_page(&self, page: i64, page_size: i64) -> Result<Vec<Post>, StoreError> {
        let offset = validation::page_offset(page, page_size).map_err(StoreError::InvalidArgument)?;
        let mut posts = self.list_all().await?;
        posts.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(posts
            .into_iter()
            .skip(offset as usize)
            .take(page_size as usize)
            .collect())
    }

    async fn list_by_username(&self, username: &str) -> Result<Vec<Post>, StoreError> {
        let mut posts: Vec<Post> = self
            .docs
            .list(&Self::posts_collection(username))
            .await?
            .into_iter()
            .map(|(_, doc)| from_document::<PostDoc>(doc).map(Post::from))
            .collect::<Result<_, _>>()?;
        posts.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(posts)
    }

    async fn delete_by_id(&self, id: i64) -> Result<bool, StoreError> {
        let target = self
            .all_posts()
            .await?
            .into_iter()
            .find(|(_, post)| post.id == id);
        match target {
            Some((path, _)) => self.docs.delete(&path).await,
            None => Ok(false),
        }
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        let mut deleted = 0u64;
        for (path, _) in self.docs.list_group("posts").await? {
            if self.docs.delete(&path).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}
