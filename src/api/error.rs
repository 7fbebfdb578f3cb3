use axum::{
    Json,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use super::response::Reply;
use crate::services::{AuthError, UserError};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),

    Unauthorized(String),

    Forbidden(String),

    NotFound(String),

    MethodNotAllowed(Method),

    NotAcceptable(String),

    NotImplemented(String),

    DatabaseError(String),

    InternalError(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest(msg) => write!(f, "Bad request: {msg}"),
            Self::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            Self::Forbidden(msg) => write!(f, "Forbidden: {msg}"),
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::MethodNotAllowed(method) => write!(f, "{method} method not allowed."),
            Self::NotAcceptable(msg) => write!(f, "Not acceptable: {msg}"),
            Self::NotImplemented(msg) => write!(f, "Not implemented: {msg}"),
            Self::DatabaseError(msg) => write!(f, "Database error: {msg}"),
            Self::InternalError(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            Self::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Self::DatabaseError(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The JSON body: `{"error": ...}` for 405, `{"message": ...}` otherwise.
    /// Server-side failures are logged here and reported with a generic message.
    #[must_use]
    pub fn to_reply(&self) -> Reply {
        let body = match self {
            Self::MethodNotAllowed(method) => json!({ "error": format!("{method} method not allowed.") }),
            Self::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                json!({ "message": "A database error occurred" })
            }
            Self::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                json!({ "message": "An internal error occurred" })
            }
            Self::BadRequest(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::NotAcceptable(msg)
            | Self::NotImplemented(msg) => json!({ "message": msg }),
        };

        Reply::new(self.status(), Some(body))
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }
}

/// Plain JSON rendering for paths that never reach the [`Renderer`](super::response::Renderer).
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let reply = self.to_reply();
        (reply.status, Json(reply.body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::InternalError(format!("Serialization failed: {err}"))
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials | AuthError::InvalidApiKey => {
                Self::Unauthorized(err.to_string())
            }
            AuthError::Database(msg) => Self::DatabaseError(msg),
            AuthError::Internal(msg) => Self::InternalError(msg),
        }
    }
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::NotFound => Self::NotFound(err.to_string()),
            UserError::Validation(msg) | UserError::Conflict(msg) => Self::BadRequest(msg),
            UserError::Database(msg) => Self::DatabaseError(msg),
            UserError::Internal(msg) => Self::InternalError(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_not_allowed_body() {
        let reply = ApiError::MethodNotAllowed(Method::DELETE).to_reply();
        assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(reply.body, Some(json!({"error": "DELETE method not allowed."})));
    }

    #[test]
    fn test_client_error_statuses() {
        let cases = [
            (ApiError::Forbidden("staff only".into()), StatusCode::FORBIDDEN),
            (ApiError::NotAcceptable("no renderer".into()), StatusCode::NOT_ACCEPTABLE),
            (ApiError::NotImplemented("later".into()), StatusCode::NOT_IMPLEMENTED),
        ];

        for (err, status) in cases {
            let reply = err.to_reply();
            assert_eq!(reply.status, status);
            assert!(reply.body.unwrap()["message"].is_string());
        }
    }

    #[test]
    fn test_internal_errors_are_not_leaked() {
        let reply = ApiError::internal("connection reset by peer").to_reply();
        assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(reply.body, Some(json!({"message": "An internal error occurred"})));
    }

    #[test]
    fn test_auth_error_conversion() {
        let err = ApiError::from(AuthError::InvalidCredentials);
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            err.to_reply().body,
            Some(json!({"message": "Username and password don't match"}))
        );
    }

    #[test]
    fn test_user_error_conversion() {
        let err = ApiError::from(UserError::NotFound);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_reply().body, Some(json!({"message": "User not found."})));

        let err = ApiError::from(UserError::Conflict("taken".to_string()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
