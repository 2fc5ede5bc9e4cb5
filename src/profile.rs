//! Profile assembly: bio, profile image and post list for a username.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::db::models::{PostDraft, ProfilePost};
use crate::media::DynMediaRelocator;
use crate::moderation::{ModerationContext, ModerationPolicy};
use crate::store::kv::keys;
use crate::store::{DynPostRepository, DynUserRepository, KvStore, StoreError};

pub const DEFAULT_PROFILE_IMAGE: &str = "/media/default-profile.jpg";
pub const EMPTY_BIO: &str = "No bio yet.";

#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub username: String,
    pub bio: Option<String>,
    /// What to display: the bio, or a placeholder when there is none
    pub bio_text: String,
    pub profile_image: String,
    pub has_profile_image: bool,
    pub posts: Vec<ProfilePost>,
}

pub struct ProfileService {
    users: DynUserRepository,
    posts: DynPostRepository,
    kv: KvStore,
    media: DynMediaRelocator,
    moderation: Arc<ModerationPolicy>,
}

impl ProfileService {
    pub fn new(
        users: DynUserRepository,
        posts: DynPostRepository,
        kv: KvStore,
        media: DynMediaRelocator,
        moderation: Arc<ModerationPolicy>,
    ) -> Self {
        Self {
            users,
            posts,
            kv,
            media,
            moderation,
        }
    }

    /// The signed-in user's own profile. Posts are shown unfiltered.
    pub async fn own_profile(&self, username: &str) -> Result<ProfileView, StoreError> {
        self.assemble(username, false).await
    }

    /// Someone else's profile. Posts flagged by the content policy are
    /// left out.
    pub async fn other_profile(&self, username: &str) -> Result<ProfileView, StoreError> {
        self.assemble(username, true).await
    }

    pub async fn update_bio(&self, username: &str, bio: &str) -> Result<(), StoreError> {
        self.users.update_bio(username, bio).await
    }

    pub async fn set_profile_image(&self, username: &str, uri: &str) -> Result<(), StoreError> {
        self.users.set_profile_image(username, uri).await
    }

    /// Write a text post from the profile page. Returns the new id.
    pub async fn create_text_post(&self, username: &str, content: &str) -> Result<i64, StoreError> {
        self.posts
            .create(PostDraft {
                image: None,
                description: content.to_string(),
                username: username.to_string(),
            })
            .await
    }

    /// Move a staged upload into durable media and make it the profile
    /// image, then drop the image it replaced. Returns the new image URI.
    /// The staged file is removed whether or not this succeeds.
    pub async fn replace_profile_image(
        &self,
        username: &str,
        staged: &Path,
    ) -> Result<String, StoreError> {
        let result = self.install_profile_image(username, staged).await;
        if result.is_err() {
            if let Err(cleanup) = self.media.remove(staged).await {
                tracing::warn!(error = %cleanup, "failed to clear staged profile image");
            }
        }
        result
    }

    async fn install_profile_image(
        &self,
        username: &str,
        staged: &Path,
    ) -> Result<String, StoreError> {
        if self.users.find_by_username(username).await?.is_none() {
            return Err(StoreError::NotFound(format!("user {username}")));
        }
        let previous = self.users.get_profile_image(username).await?;

        let durable = self.media.relocate(staged).await?;
        let uri = media_uri(&durable);

        if let Err(e) = self.users.set_profile_image(username, &uri).await {
            if let Err(cleanup) = self.media.remove(&durable).await {
                tracing::warn!(error = %cleanup, "failed to remove unused profile image");
            }
            return Err(e);
        }

        if let Some(previous) = previous.filter(|p| *p != uri) {
            self.discard_media(&previous).await;
        }
        Ok(uri)
    }

    /// Best effort: URIs outside local media are left alone.
    async fn discard_media(&self, uri: &str) {
        let Some(name) = uri.strip_prefix("/media/") else {
            return;
        };
        let removed = match self.media.open(name).await {
            Ok(Some(path)) => self.media.remove(&path).await,
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = removed {
            tracing::warn!(uri = %uri, error = %e, "failed to remove replaced profile image");
        }
    }

    async fn assemble(&self, username: &str, moderate: bool) -> Result<ProfileView, StoreError> {
        if self.users.find_by_username(username).await?.is_none() {
            return Err(StoreError::NotFound(format!("user {username}")));
        }

        let bio = self.users.get_bio(username).await?;
        let image = self.users.get_profile_image(username).await?;
        let mut posts = self.cached_posts(username).await?;

        if moderate {
            posts.retain(|p| !self.moderation.is_flagged(ModerationContext::Content, &p.content));
        }

        Ok(ProfileView {
            username: username.to_string(),
            bio_text: bio.clone().unwrap_or_else(|| EMPTY_BIO.to_string()),
            bio,
            has_profile_image: image.is_some(),
            profile_image: image.unwrap_or_else(|| DEFAULT_PROFILE_IMAGE.to_string()),
            posts,
        })
    }

    /// Read `posts_<username>`, rebuilding it from the post store when
    /// it is missing or unreadable. Post writes delete the key, which
    /// voids the lease of a rebuild that read the list before them.
    async fn cached_posts(&self, username: &str) -> Result<Vec<ProfilePost>, StoreError> {
        let key = keys::posts(username);

        if let Some(raw) = self.kv.get(&key)? {
            match serde_json::from_str::<Vec<ProfilePost>>(&raw) {
                Ok(posts) => return Ok(posts),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "discarding unreadable post cache");
                    self.kv.remove(&key)?;
                }
            }
        }

        let lease = self.kv.lease(&key)?;
        let posts: Vec<ProfilePost> = self
            .posts
            .list_by_username(username)
            .await?
            .iter()
            .map(ProfilePost::from)
            .collect();
        if let Some(lease) = lease {
            self.kv.fill(&key, &lease, &serde_json::to_string(&posts)?)?;
        }
        Ok(posts)
    }
}

/// URI under which a durable media file is served.
pub fn media_uri(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("/media/{name}")
}
