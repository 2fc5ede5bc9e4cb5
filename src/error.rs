use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::auth::AuthError;
use crate::media::MediaError;
use crate::store::StoreError;
use crate::validation::Rejection;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    Rejected(#[from] Rejection),

    #[error("{0}")]
    Auth(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Rejected(r) => AppError::Rejected(r),
            StoreError::InvalidArgument(msg) => AppError::BadRequest(msg),
            StoreError::NotFound(_) => AppError::NotFound,
            StoreError::MediaMoveFailed(e) => AppError::Media(e),
            StoreError::Unavailable(e) => AppError::StorageUnavailable(e.to_string()),
            StoreError::Sql(e) => AppError::StorageUnavailable(e.to_string()),
            StoreError::Serialization(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::UnknownUser | AuthError::WrongPassword => AppError::Auth(err.to_string()),
            AuthError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Rejected(r) => (StatusCode::UNPROCESSABLE_ENTITY, r.to_string()),
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Media(e @ (MediaError::SourceMissing(_) | MediaError::InvalidName(_))) => {
                // The detail names server paths
                tracing::warn!("Rejected media: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid media".to_string())
            }
            AppError::Media(e) => {
                tracing::error!("Media error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::StorageUnavailable(msg) => {
                tracing::error!("Storage unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Storage unavailable".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn response_status(err: AppError) -> StatusCode {
        let response = err.into_response();
        response.status()
    }

    #[test]
    fn not_found_returns_404() {
        assert_eq!(response_status(AppError::NotFound), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unauthorized_returns_401() {
        assert_eq!(
            response_status(AppError::Unauthorized),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn bad_request_returns_400() {
        assert_eq!(
            response_status(AppError::BadRequest("oops".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn internal_returns_500() {
        assert_eq!(
            response_status(AppError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn rejection_returns_422() {
        let err: AppError = StoreError::Rejected(Rejection::BioTooLong).into();
        assert_eq!(response_status(err), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn invalid_argument_returns_400() {
        let err: AppError = StoreError::InvalidArgument("page".into()).into();
        assert_eq!(response_status(err), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn wrong_password_returns_401() {
        let err: AppError = AuthError::WrongPassword.into();
        assert_eq!(response_status(err), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn missing_media_returns_400() {
        let err: AppError =
            StoreError::MediaMoveFailed(MediaError::SourceMissing("/tmp/x.jpg".into())).into();
        assert_eq!(response_status(err), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn media_errors_do_not_expose_paths() {
        for err in [
            MediaError::SourceMissing("/srv/poster/staging/0190-x.jpg".into()),
            MediaError::InvalidName("../../etc/passwd".into()),
        ] {
            let response = AppError::from(StoreError::MediaMoveFailed(err)).into_response();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(body["error"], "Invalid media");
        }
    }
}
