//! Domain service for users and their public profiles.

use serde::Serialize;
use thiserror::Error;

use crate::db::{NewUser, User};

/// Errors specific to user operations.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("User not found.")]
    NotFound,

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for UserError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for UserError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Public representation of a user's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileDto {
    pub username: String,
    pub is_admin: bool,
    /// Seconds since the Unix epoch.
    pub joined_at: i64,
    pub resource_uri: String,
    /// Only present on the caller's own account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl ProfileDto {
    #[must_use]
    pub fn from_user(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            is_admin: user.is_staff,
            joined_at: user.joined_at_epoch(),
            resource_uri: user_resource_uri(user.id),
            api_key: None,
        }
    }
}

#[must_use]
pub fn user_resource_uri(id: i32) -> String {
    format!("/api/users/{id}/")
}

/// Domain service trait for user and profile management.
#[async_trait::async_trait]
pub trait UserService: Send + Sync {
    /// Profile for `user`, with the API key when `include_account` is set.
    /// Creates the profile (and key) on first access.
    async fn profile(&self, user: &User, include_account: bool) -> Result<ProfileDto, UserError>;

    /// Finds an active user by numeric id or, otherwise, by username ignoring case.
    async fn lookup(&self, user_ref: &str) -> Result<Option<User>, UserError>;

    /// One page of profiles plus the total number of profiles.
    async fn list_profiles(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<ProfileDto>, u64), UserError>;

    /// Registers a user.
    ///
    /// # Errors
    ///
    /// Returns [`UserError::Validation`] for malformed fields and
    /// [`UserError::Conflict`] when the username is taken.
    async fn create_user(&self, new_user: NewUser) -> Result<User, UserError>;
}
