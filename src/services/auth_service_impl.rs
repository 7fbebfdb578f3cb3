//! `SeaORM` implementation of the `AuthService` trait.

use crate::config::ApiConfig;
use crate::db::{Store, User};
use crate::services::auth_service::{AuthError, AuthService};
use async_trait::async_trait;

pub struct SeaOrmAuthService {
    store: Store,
    api: ApiConfig,
}

impl SeaOrmAuthService {
    #[must_use]
    pub const fn new(store: Store, api: ApiConfig) -> Self {
        Self { store, api }
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn resolve_user(&self, login: &str) -> Result<Option<User>, AuthError> {
        Ok(self.store.resolve_login(login, &self.api).await?)
    }

    async fn authenticate_password(&self, login: &str, password: &str) -> Result<User, AuthError> {
        let user = self
            .resolve_user(login)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !self.store.verify_user_password(user.id, password).await? {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(user)
    }

    async fn authenticate_api_key(&self, login: &str, token: &str) -> Result<User, AuthError> {
        let user = self
            .resolve_user(login)
            .await?
            .ok_or(AuthError::InvalidApiKey)?;

        if !self.store.verify_api_key(user.id, token).await? {
            return Err(AuthError::InvalidApiKey);
        }

        Ok(user)
    }

    async fn session_user(&self, user_id: i32) -> Result<Option<User>, AuthError> {
        Ok(self.store.get_active_user(user_id).await?)
    }

    async fn get_or_create_api_key(&self, user_id: i32) -> Result<String, AuthError> {
        Ok(self.store.get_or_create_api_key(user_id).await?)
    }
}
