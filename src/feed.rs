//! Main feed: every image post, shuffled once per refresh, then narrowed
//! by a live search over descriptions. Text posts stay on profiles.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::db::models::Post;
use crate::store::{PostRepository, StoreError};

/// A shuffled snapshot of all posts. Filtering never reshuffles.
#[derive(Debug, Clone, Default)]
pub struct Feed {
    posts: Vec<Post>,
}

impl Feed {
    /// Fetch every image post and apply a fresh uniform shuffle.
    pub async fn load(repo: &dyn PostRepository) -> Result<Self, StoreError> {
        let mut posts = repo.list_all().await?;
        posts.retain(|post| !post.is_text());
        tracing::debug!(count = posts.len(), "feed loaded");
        Ok(Self::from_posts(posts, &mut rand::thread_rng()))
    }

    pub fn from_posts<R: Rng + ?Sized>(mut posts: Vec<Post>, rng: &mut R) -> Self {
        // Fisher-Yates
        posts.shuffle(rng);
        Self { posts }
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Posts whose description contains `query`, ignoring case, in feed order.
    pub fn filter(&self, query: &str) -> Vec<&Post> {
        let needle = query.to_lowercase();
        self.posts
            .iter()
            .filter(|post| matches_query(&post.description, &needle))
            .collect()
    }

    pub fn into_filtered(self, query: &str) -> Vec<Post> {
        let needle = query.to_lowercase();
        self.posts
            .into_iter()
            .filter(|post| matches_query(&post.description, &needle))
            .collect()
    }
}

/// `needle` must already be lowercased.
fn matches_query(description: &str, needle: &str) -> bool {
    needle.is_empty() || description.to_lowercase().contains(needle)
}
