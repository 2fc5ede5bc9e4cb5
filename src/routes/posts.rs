use axum::extract::multipart::Multipart;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::db::models::{Post, PostDraft};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::feed::Feed;
use crate::profile::media_uri;
use crate::state::AppState;

/// A post as sent to clients: the image is a `/media/...` URI rather than
/// a filesystem path, and absent for text posts.
#[derive(Debug, Serialize)]
pub struct PostView {
    pub id: i64,
    pub image: Option<String>,
    pub description: String,
    pub username: String,
    pub created_at: String,
}

impl From<Post> for PostView {
    fn from(post: Post) -> Self {
        Self {
            id: post.id,
            image: post.image.as_deref().map(|p| media_uri(std::path::Path::new(p))),
            description: post.description,
            username: post.username,
            created_at: post.created_at,
        }
    }
}

#[derive(Deserialize)]
pub struct FeedQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
}

#[derive(Serialize)]
pub struct Created {
    pub id: i64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/feed", get(feed))
        .route("/posts", get(list_page).post(create))
        .route("/posts/{id}", delete(remove))
        .route("/media/{name}", get(media))
}

/// GET /feed?q= : every post, freshly shuffled, narrowed by description
async fn feed(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> AppResult<Json<Vec<PostView>>> {
    let feed = Feed::load(state.posts.as_ref()).await?;
    let posts = feed
        .into_filtered(&query.q)
        .into_iter()
        .map(PostView::from)
        .collect();
    Ok(Json(posts))
}

/// GET /posts?page= : newest first
async fn list_page(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Vec<PostView>>> {
    let page = query.page.unwrap_or(1);
    let posts = state
        .posts
        .list_page(page, state.config.feed.page_size)
        .await?;
    Ok(Json(posts.into_iter().map(PostView::from).collect()))
}

/// POST /posts: multipart `image` + `description`
async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<Response> {
    let form = super::UploadForm::read(multipart, "image").await?;
    let file = form
        .file
        .as_ref()
        .ok_or_else(|| AppError::BadRequest("An image is required".into()))?;
    let description = form.field("description").unwrap_or_default().to_string();

    let staged = state.media.stage(&file.file_name, &file.data).await?;
    let draft = PostDraft {
        image: Some(staged.to_string_lossy().into_owned()),
        description,
        username: user.username.clone(),
    };

    match state.posts.create(draft).await {
        Ok(id) => Ok((StatusCode::CREATED, Json(Created { id })).into_response()),
        Err(e) => {
            // Rejected drafts never leave staging
            if let Err(cleanup) = state.media.remove(&staged).await {
                tracing::warn!(error = %cleanup, "failed to clear staged upload");
            }
            Err(e.into())
        }
    }
}

/// DELETE /posts/{id}: author or admin only. The media file goes first.
async fn remove(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let post = state.posts.get(id).await?.ok_or(AppError::NotFound)?;

    if post.username != user.username && !user.is_admin {
        return Err(AppError::Forbidden);
    }

    delete_post(&state, &post).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Remove a post's media, if any, then its row.
pub(super) async fn delete_post(state: &AppState, post: &Post) -> AppResult<()> {
    if let Some(image) = &post.image {
        state.media.remove(std::path::Path::new(image)).await?;
    }
    state.posts.delete_by_id(post.id).await?;
    Ok(())
}

/// GET /media/{name}
async fn media(State(state): State<AppState>, Path(name): Path<String>) -> AppResult<Response> {
    let path = state.media.open(&name).await?.ok_or(AppError::NotFound)?;
    let data = tokio::fs::read(&path)
        .await
        .map_err(|e| AppError::Internal(format!("reading {}: {}", path.display(), e)))?;
    let mime = mime_guess::from_path(&path).first_or_octet_stream();

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime.as_ref().to_string()),
            (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
        ],
        data,
    )
        .into_response())
}
