use serde::{Deserialize, Serialize};

/// A row of the `posts` table. Text posts written from a profile page
/// have no image and carry their text in `description`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub image: Option<String>,
    pub description: String,
    pub username: String,
    pub created_at: String,
}

/// Input for creating a post. `image` is the transient path the media
/// is moved out of before the row is written, or `None` for a text post.
#[derive(Debug, Clone)]
pub struct PostDraft {
    pub image: Option<String>,
    pub description: String,
    pub username: String,
}

impl Post {
    pub fn is_text(&self) -> bool {
        self.image.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub profile_image: Option<String>,
    pub bio: Option<String>,
    pub created_at: String,
}

/// A post as listed on a profile page, also the shape of the
/// `posts_<username>` cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePost {
    pub id: i64,
    pub content: String,
    pub username: String,
}

impl From<&Post> for ProfilePost {
    fn from(post: &Post) -> Self {
        Self {
            id: post.id,
            content: post.description.clone(),
            username: post.username.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub expires_at: String,
}
