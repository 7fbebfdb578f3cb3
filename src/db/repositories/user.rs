use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, Set,
};
use tokio::task;

use crate::config::SecurityConfig;
use crate::entities::users;

/// User data returned from repository (without sensitive password hash)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_active: bool,
    pub date_joined: String,
}

impl User {
    /// Staff or superuser.
    #[must_use]
    pub const fn has_staff_access(&self) -> bool {
        self.is_staff || self.is_superuser
    }

    /// Join date as seconds since the Unix epoch (0 if the stored value is unparsable).
    #[must_use]
    pub fn joined_at_epoch(&self) -> i64 {
        chrono::DateTime::parse_from_rfc3339(&self.date_joined)
            .map(|dt| dt.timestamp())
            .unwrap_or_default()
    }
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            is_staff: model.is_staff,
            is_superuser: model.is_superuser,
            is_active: model.is_active,
            date_joined: model.date_joined,
        }
    }
}

/// Fields required to register a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i32) -> Result<Option<User>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(User::from))
    }

    /// Active user whose username matches ignoring case (exact match preferred).
    pub async fn get_active_by_username_iexact(&self, username: &str) -> Result<Option<User>> {
        let user = self.find_unique(LoginField::Username, username, true).await?;

        Ok(user.map(User::from))
    }

    /// Active user by username, then by email when `email_as_username` is set.
    /// Inactive accounts never match, so they cannot shadow an email login.
    pub async fn resolve_login(
        &self,
        login: &str,
        case_insensitive: bool,
        email_as_username: bool,
    ) -> Result<Option<User>> {
        if let Some(user) = self
            .find_unique(LoginField::Username, login, case_insensitive)
            .await?
        {
            return Ok(Some(user.into()));
        }

        if !email_as_username {
            return Ok(None);
        }

        let user = self
            .find_unique(LoginField::Email, login, case_insensitive)
            .await?;

        Ok(user.map(User::from))
    }

    /// Exact match among active users first; if none and `case_insensitive`,
    /// a match on the folded column. More than one candidate counts as no match.
    async fn find_unique(
        &self,
        field: LoginField,
        value: &str,
        case_insensitive: bool,
    ) -> Result<Option<users::Model>> {
        let mut exact = users::Entity::find()
            .filter(users::Column::IsActive.eq(true))
            .filter(field.column().eq(value))
            .limit(2)
            .all(&self.conn)
            .await
            .context("Failed to query user by login")?;

        if exact.len() == 1 {
            return Ok(exact.pop());
        }

        if !exact.is_empty() || !case_insensitive {
            return Ok(None);
        }

        let mut folded = users::Entity::find()
            .filter(users::Column::IsActive.eq(true))
            .filter(field.folded_column().eq(fold_login(value)))
            .limit(2)
            .all(&self.conn)
            .await
            .context("Failed to query user by case-insensitive login")?;

        if folded.len() == 1 {
            Ok(folded.pop())
        } else {
            Ok(None)
        }
    }

    /// Case-insensitive check over all users, active or not.
    pub async fn username_taken(&self, username: &str) -> Result<bool> {
        let count = users::Entity::find()
            .filter(users::Column::UsernameFolded.eq(fold_login(username)))
            .limit(1)
            .all(&self.conn)
            .await
            .context("Failed to check username availability")?
            .len();

        Ok(count > 0)
    }

    /// Verify password for a user
    /// Note: This uses `spawn_blocking` because Argon2 hashing is CPU-intensive
    /// and would block the async runtime if run directly.
    pub async fn verify_password(&self, user_id: i32, password: &str) -> Result<bool> {
        let user = users::Entity::find_by_id(user_id)
            .one(&self.conn)
            .await
            .context("Failed to query user for password verification")?;

        let Some(user) = user else {
            return Ok(false);
        };

        let password_hash = user.password_hash;
        let password = password.to_string();

        let is_valid = task::spawn_blocking(move || {
            let parsed_hash = PasswordHash::new(&password_hash)
                .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

            let argon2 = Argon2::default();
            Ok::<bool, anyhow::Error>(
                argon2
                    .verify_password(password.as_bytes(), &parsed_hash)
                    .is_ok(),
            )
        })
        .await
        .context("Password verification task panicked")??;

        Ok(is_valid)
    }

    pub async fn create(&self, new_user: NewUser, config: &SecurityConfig) -> Result<User> {
        let password = new_user.password;
        let config = config.clone();
        let password_hash = task::spawn_blocking(move || hash_password(&password, Some(&config)))
            .await
            .context("Password hashing task panicked")??;

        let user = users::ActiveModel {
            username_folded: Set(fold_login(&new_user.username)),
            email_folded: Set(fold_login(&new_user.email)),
            username: Set(new_user.username),
            email: Set(new_user.email),
            password_hash: Set(password_hash),
            is_staff: Set(new_user.is_staff),
            is_superuser: Set(new_user.is_superuser),
            is_active: Set(true),
            date_joined: Set(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert user")?;

        Ok(user.into())
    }
}

#[derive(Debug, Clone, Copy)]
enum LoginField {
    Username,
    Email,
}

impl LoginField {
    const fn column(self) -> users::Column {
        match self {
            Self::Username => users::Column::Username,
            Self::Email => users::Column::Email,
        }
    }

    const fn folded_column(self) -> users::Column {
        match self {
            Self::Username => users::Column::UsernameFolded,
            Self::Email => users::Column::EmailFolded,
        }
    }
}

/// Unicode lowercase, the form stored in `username_folded` and `email_folded`.
#[must_use]
pub fn fold_login(value: &str) -> String {
    value.to_lowercase()
}

/// Hash a password using Argon2id with optional custom params.
/// If config is None, uses the argon2 crate defaults.
pub fn hash_password(password: &str, config: Option<&SecurityConfig>) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let argon2 = if let Some(cfg) = config {
        let params = Params::new(
            cfg.argon2_memory_cost_kib,
            cfg.argon2_time_cost,
            cfg.argon2_parallelism,
            None,
        )
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    } else {
        Argon2::default()
    };

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}
