//! Domain service for credential checks.
//!
//! Resolves logins to users and verifies passwords and API keys. Shared by
//! the Basic auth and API key strategies and by session login.

use thiserror::Error;

use crate::db::User;

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Username and password don't match")]
    InvalidCredentials,

    #[error("Can't find an user with this username and api_key")]
    InvalidApiKey,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Looks a login up among active users by username, then by email when enabled.
    async fn resolve_user(&self, login: &str) -> Result<Option<User>, AuthError>;

    /// Verifies a login/password pair.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] for unknown or inactive users
    /// and for wrong passwords.
    async fn authenticate_password(&self, login: &str, password: &str) -> Result<User, AuthError>;

    /// Verifies a login/API key pair.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidApiKey`] for unknown or inactive users and
    /// for keys that do not belong to the user.
    async fn authenticate_api_key(&self, login: &str, token: &str) -> Result<User, AuthError>;

    /// Loads the active user a session points at.
    async fn session_user(&self, user_id: i32) -> Result<Option<User>, AuthError>;

    /// Gets the user's API key, creating it on first use.
    async fn get_or_create_api_key(&self, user_id: i32) -> Result<String, AuthError>;
}
