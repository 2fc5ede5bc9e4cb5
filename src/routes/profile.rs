use axum::extract::multipart::Multipart;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::profile::ProfileView;
use crate::state::AppState;

use super::posts::Created;

#[derive(Deserialize)]
pub struct BioRequest {
    pub bio: String,
}

#[derive(Deserialize)]
pub struct TextPostRequest {
    pub content: String,
}

#[derive(Serialize)]
pub struct ImageResponse {
    pub profile_image: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(own_profile))
        .route("/profile/bio", put(update_bio))
        .route("/profile/image", put(update_image))
        .route("/profile/posts", post(create_text_post))
        .route("/profile/posts/{id}", delete(delete_own_post))
        .route("/users/{username}", get(other_profile))
}

async fn own_profile(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<ProfileView>> {
    Ok(Json(state.profiles.own_profile(&user.username).await?))
}

/// GET /users/{username}: moderated, unless the viewer is that user
async fn other_profile(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(username): Path<String>,
) -> AppResult<Json<ProfileView>> {
    let view = match viewer.0 {
        Some(user) if user.username == username => state.profiles.own_profile(&username).await?,
        _ => state.profiles.other_profile(&username).await?,
    };
    Ok(Json(view))
}

async fn update_bio(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<BioRequest>,
) -> AppResult<StatusCode> {
    state.profiles.update_bio(&user.username, &req.bio).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /profile/image: multipart `image`
async fn update_image(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<Json<ImageResponse>> {
    let form = super::UploadForm::read(multipart, "image").await?;
    let file = form
        .file
        .ok_or_else(|| AppError::BadRequest("An image is required".into()))?;

    let staged = state.media.stage(&file.file_name, &file.data).await?;
    let profile_image = state
        .profiles
        .replace_profile_image(&user.username, &staged)
        .await?;
    Ok(Json(ImageResponse { profile_image }))
}

async fn create_text_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<TextPostRequest>,
) -> AppResult<(StatusCode, Json<Created>)> {
    let id = state
        .profiles
        .create_text_post(&user.username, &req.content)
        .await?;
    Ok((StatusCode::CREATED, Json(Created { id })))
}

/// DELETE /profile/posts/{id}: own posts only
async fn delete_own_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let post = state.posts.get(id).await?.ok_or(AppError::NotFound)?;
    if post.username != user.username {
        return Err(AppError::Forbidden);
    }

    super::posts::delete_post(&state, &post).await?;
    Ok(StatusCode::NO_CONTENT)
}
