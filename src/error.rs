use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::users::UserError;

/// Error returned by HTTP handlers, rendered as `{"error": .., "code": ..}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    User(#[from] UserError),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    BadRequest(String),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::User(err) => match err {
                UserError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
                UserError::Credentials(_) => {
                    (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS", err.to_string())
                }
                UserError::InvalidClaim(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_CLAIM", err.to_string())
                }
                UserError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                UserError::InvalidId(_) => (StatusCode::BAD_REQUEST, "INVALID_ID", err.to_string()),
                UserError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT", err.to_string()),
                UserError::BackendUnavailable(msg) => {
                    tracing::error!(error = %msg, "backend unavailable");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "BACKEND_UNAVAILABLE",
                        "storage backend unavailable".to_string(),
                    )
                }
                UserError::Hashing(_)
                | UserError::Signing(_)
                | UserError::TransactionAborted(_)
                | UserError::Store(_) => {
                    tracing::error!(error = %err, "internal error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "an internal error occurred".to_string(),
                    )
                }
            },
            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", (*msg).to_string())
            }
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", (*msg).to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let body = json!({
            "error": message,
            "code": code,
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{store::StoreError, users::CredentialsError};

    fn status_of(err: impl Into<AppError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn maps_domain_errors_to_status_codes() {
        assert_eq!(status_of(UserError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(UserError::from(CredentialsError::EmailNotFound)),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status_of(UserError::InvalidClaim(9)), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(UserError::from("bad".parse::<crate::store::ObjectId>().unwrap_err())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(UserError::Conflict("email".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_of(UserError::BackendUnavailable("down".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(UserError::TransactionAborted("dup".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(UserError::Store(StoreError::NotFound)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(status_of(AppError::Forbidden("no")), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(AppError::BadRequest("bad body".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn credential_failures_share_a_code_and_differ_only_in_message() {
        let unknown = AppError::from(UserError::from(CredentialsError::EmailNotFound)).parts();
        let wrong = AppError::from(UserError::from(CredentialsError::IncorrectPassword)).parts();
        assert_eq!(unknown.0, wrong.0);
        assert_eq!(unknown.1, wrong.1);
        assert_eq!(unknown.2, "email not found");
        assert_eq!(wrong.2, "incorrect password");
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let (_, code, message) =
            AppError::from(UserError::Hashing("rng exploded".into())).parts();
        assert_eq!(code, "INTERNAL_ERROR");
        assert!(!message.contains("rng"));
    }
}
