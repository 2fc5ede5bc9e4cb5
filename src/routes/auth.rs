use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::db::models::Session;
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub username: String,
    pub token: String,
    pub expires_at: String,
}

#[derive(Serialize)]
pub struct MeResponse {
    pub username: String,
    pub is_admin: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

// -- Cookie helpers --

fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        name, token, max_age_secs
    )
}

fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0", name)
}

fn signed_in(state: &AppState, status: StatusCode, session: Session) -> Response {
    let cookie = session_cookie(
        &state.config.auth.cookie_name,
        &session.token,
        state.config.auth.session_hours,
    );
    (
        status,
        [(header::SET_COOKIE, cookie)],
        Json(SessionResponse {
            username: session.username,
            token: session.token,
            expires_at: session.expires_at,
        }),
    )
        .into_response()
}

/// POST /auth/signup: create an account and sign it in
async fn signup(
    State(state): State<AppState>,
    Json(req): Json<Credentials>,
) -> AppResult<Response> {
    let session = state.accounts.signup(&req.username, &req.password).await?;
    Ok(signed_in(&state, StatusCode::CREATED, session))
}

/// POST /auth/login
async fn login(
    State(state): State<AppState>,
    Json(req): Json<Credentials>,
) -> AppResult<Response> {
    let session = state.accounts.login(&req.username, &req.password).await?;
    Ok(signed_in(&state, StatusCode::OK, session))
}

/// POST /auth/logout: destroy session and clear cookie
async fn logout(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    state.accounts.logout(&user.token)?;
    Ok((
        StatusCode::NO_CONTENT,
        [(
            header::SET_COOKIE,
            clear_session_cookie(&state.config.auth.cookie_name),
        )],
    )
        .into_response())
}

async fn me(user: CurrentUser) -> Json<MeResponse> {
    Json(MeResponse {
        username: user.username,
        is_admin: user.is_admin,
    })
}
