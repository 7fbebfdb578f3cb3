//! `SeaORM` implementation of the `UserService` trait.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::config::SecurityConfig;
use crate::db::{NewUser, Store, User};
use crate::services::user_service::{ProfileDto, UserError, UserService};

const MAX_USERNAME_LEN: usize = 150;
const MIN_PASSWORD_LEN: usize = 8;

pub struct SeaOrmUserService {
    store: Store,
    security: SecurityConfig,
}

impl SeaOrmUserService {
    #[must_use]
    pub const fn new(store: Store, security: SecurityConfig) -> Self {
        Self { store, security }
    }
}

/// Checks the fields of a user about to be registered.
pub fn validate_new_user(new_user: &NewUser) -> Result<(), UserError> {
    let username = new_user.username.as_str();

    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        return Err(UserError::Validation(format!(
            "Username must be between 1 and {MAX_USERNAME_LEN} characters"
        )));
    }

    static USERNAME_RE: OnceLock<Regex> = OnceLock::new();
    let username_re =
        USERNAME_RE.get_or_init(|| Regex::new(r"^[\w.@+-]+$").expect("Invalid regex"));

    if !username_re.is_match(username) {
        return Err(UserError::Validation(
            "Username may contain only letters, digits and @/./+/-/_".to_string(),
        ));
    }

    // `/api/users/<ref>/` treats digits as an id and `self` as the caller.
    if username.chars().all(|c| c.is_ascii_digit()) || username.eq_ignore_ascii_case("self") {
        return Err(UserError::Validation(format!(
            "Username '{username}' is reserved"
        )));
    }

    if !new_user.email.contains('@') {
        return Err(UserError::Validation("Enter a valid email address".to_string()));
    }

    if new_user.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(UserError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    Ok(())
}

#[async_trait]
impl UserService for SeaOrmUserService {
    async fn profile(&self, user: &User, include_account: bool) -> Result<ProfileDto, UserError> {
        self.store.get_or_create_profile(user.id).await?;

        let mut dto = ProfileDto::from_user(user);
        if include_account {
            dto.api_key = Some(self.store.get_or_create_api_key(user.id).await?);
        }

        Ok(dto)
    }

    async fn lookup(&self, user_ref: &str) -> Result<Option<User>, UserError> {
        if !user_ref.is_empty() && user_ref.chars().all(|c| c.is_ascii_digit()) {
            let Ok(id) = user_ref.parse::<i32>() else {
                return Ok(None);
            };
            return Ok(self.store.get_active_user(id).await?);
        }

        Ok(self.store.get_active_user_by_username(user_ref).await?)
    }

    async fn list_profiles(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<ProfileDto>, u64), UserError> {
        let total = self.store.count_active_profiles().await?;
        let users = self.store.list_active_profiles(offset, limit).await?;

        Ok((users.iter().map(ProfileDto::from_user).collect(), total))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, UserError> {
        validate_new_user(&new_user)?;

        if self.store.username_taken(&new_user.username).await? {
            return Err(UserError::Conflict(format!(
                "Username '{}' is already taken",
                new_user.username
            )));
        }

        let user = self.store.create_user(new_user, &self.security).await?;
        tracing::info!(user_id = user.id, username = %user.username, "User created");

        Ok(user)
    }
}
