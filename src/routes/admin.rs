use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

#[derive(Serialize)]
pub struct Deleted {
    pub deleted: u64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/users/delete-all", post(delete_all_users))
        .route("/admin/posts/delete-all", post(delete_all_posts))
}

fn require_admin(user: &CurrentUser) -> AppResult<()> {
    if user.is_admin {
        Ok(())
    } else {
        tracing::warn!(username = %user.username, "non-admin bulk delete refused");
        Err(AppError::Forbidden)
    }
}

/// Every user, their sessions and their cached profile entries. Posts stay.
async fn delete_all_users(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Deleted>> {
    require_admin(&user)?;
    let deleted = state.users.delete_all_users().await?;
    Ok(Json(Deleted { deleted }))
}

async fn delete_all_posts(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Deleted>> {
    require_admin(&user)?;
    let deleted = state.posts.delete_all().await?;
    Ok(Json(Deleted { deleted }))
}
