use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::services::dialog_state::DialogStoreError;
use crate::services::error::ReviewError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl ErrorResponse {
    fn plain(status: StatusCode, detail: String) -> Self {
        Self { status: status.as_u16(), detail, kind: None, params: None }
    }
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    BadRequest(String),
    ServiceUnavailable(String),
    Internal(String),
    Review(ReviewError),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }
}

impl From<ReviewError> for ApiError {
    fn from(err: ReviewError) -> Self {
        Self::Review(err)
    }
}

impl From<DialogStoreError> for ApiError {
    fn from(err: DialogStoreError) -> Self {
        match err {
            DialogStoreError::Unavailable => {
                Self::ServiceUnavailable("Dialog state store is unavailable".to_string())
            }
            DialogStoreError::Redis(err) => {
                tracing::warn!(error = %err, "Dialog state store failed");
                Self::ServiceUnavailable("Dialog state store is unavailable".to_string())
            }
            DialogStoreError::Corrupt(err) => Self::internal(err, "Stored dialog state is corrupt"),
        }
    }
}

fn review_status(err: &ReviewError) -> StatusCode {
    match err {
        ReviewError::UserNotFound | ReviewError::NotFound(_) => StatusCode::NOT_FOUND,
        ReviewError::AlreadyExists { .. } | ReviewError::OutOfOrder { .. } => StatusCode::CONFLICT,
        ReviewError::DeadlinePassed { .. }
        | ReviewError::InsufficientLateDays { .. }
        | ReviewError::InvalidScore(_)
        | ReviewError::InvalidTask { .. }
        | ReviewError::UnknownWorkshop { .. }
        | ReviewError::InvalidLateDays(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ReviewError::NotAuthorized { .. } => StatusCode::FORBIDDEN,
        ReviewError::InvalidIdentity(_) => StatusCode::BAD_REQUEST,
        ReviewError::StorageConflict | ReviewError::Transient { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ReviewError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn review_response(err: ReviewError) -> Response {
    let status = review_status(&err);
    let detail = match &err {
        ReviewError::Storage(inner) => {
            tracing::error!(error = %inner, "Review store failure");
            "Internal server error".to_string()
        }
        ReviewError::StorageConflict | ReviewError::Transient { .. } => {
            tracing::warn!(error = %err, "Request abandoned after storage conflicts");
            err.to_string()
        }
        other => other.to_string(),
    };

    let body = ErrorResponse {
        status: status.as_u16(),
        detail,
        kind: Some(err.kind()),
        params: Some(err.params()),
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(message) => {
                let status = StatusCode::UNAUTHORIZED;
                let mut response =
                    (status, Json(ErrorResponse::plain(status, message.to_string())))
                        .into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            }
            ApiError::BadRequest(message) => {
                let status = StatusCode::BAD_REQUEST;
                (status, Json(ErrorResponse::plain(status, message))).into_response()
            }
            ApiError::ServiceUnavailable(message) => {
                tracing::error!(error = %message, "Service unavailable");
                let status = StatusCode::SERVICE_UNAVAILABLE;
                (status, Json(ErrorResponse::plain(status, message))).into_response()
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                let status = StatusCode::INTERNAL_SERVER_ERROR;
                (status, Json(ErrorResponse::plain(status, message))).into_response()
            }
            ApiError::Review(err) => review_response(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use super::ApiError;
    use crate::repositories::StoreError;
    use crate::services::error::ReviewError;

    async fn render(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&body).expect("json"))
    }

    #[tokio::test]
    async fn domain_errors_carry_kind_and_params() {
        let (status, body) =
            render(ReviewError::InsufficientLateDays { needed: 2, available: 1 }.into()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "InsufficientLateDays");
        assert_eq!(body["params"]["needed"], 2);
        assert_eq!(body["params"]["available"], 1);

        let (status, body) =
            render(ReviewError::OutOfOrder { workshop: 1, task: 3, missing_task: 2 }.into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["params"]["missing_task"], 2);

        let (status, _) = render(ReviewError::NotAuthorized { workshop: 1, task: 1 }.into()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = render(ReviewError::Transient { attempts: 3 }.into()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn storage_failures_hide_backend_text() {
        let err = ReviewError::Storage(StoreError::Database(sqlx::Error::PoolTimedOut));
        let (status, body) = render(err.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["detail"], "Internal server error");
        assert_eq!(body["kind"], "Storage");
    }

    #[tokio::test]
    async fn unauthorized_sets_challenge_header() {
        let response = ApiError::Unauthorized("Invalid service token").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(axum::http::header::WWW_AUTHENTICATE).expect("header"),
            "Bearer"
        );
    }
}
