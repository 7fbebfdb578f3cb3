use crate::config::{ApiConfig, SecurityConfig};
use anyhow::Result;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod migrator;
pub mod repositories;

pub use repositories::user::{NewUser, User};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        let in_memory = db_url.contains(":memory:");

        if !in_memory {
            let path_str = db_url.trim_start_matches("sqlite:").trim_start_matches("//");
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        // Every connection to an in-memory database sees its own empty schema.
        let (max_connections, min_connections) = if in_memory {
            (1, 1)
        } else {
            (max_connections, min_connections)
        };

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn profile_repo(&self) -> repositories::profile::ProfileRepository {
        repositories::profile::ProfileRepository::new(self.conn.clone())
    }

    fn api_key_repo(&self) -> repositories::api_key::ApiKeyRepository {
        repositories::api_key::ApiKeyRepository::new(self.conn.clone())
    }

    /// Resolve a login string to a user: username first, then email when enabled.
    pub async fn resolve_login(&self, login: &str, api: &ApiConfig) -> Result<Option<User>> {
        self.user_repo()
            .resolve_login(login, api.case_insensitive_auth, api.email_as_username)
            .await
    }

    pub async fn get_user(&self, id: i32) -> Result<Option<User>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn get_active_user(&self, id: i32) -> Result<Option<User>> {
        Ok(self.get_user(id).await?.filter(|u| u.is_active))
    }

    pub async fn get_active_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.user_repo().get_active_by_username_iexact(username).await
    }

    pub async fn username_taken(&self, username: &str) -> Result<bool> {
        self.user_repo().username_taken(username).await
    }

    pub async fn verify_user_password(&self, user_id: i32, password: &str) -> Result<bool> {
        self.user_repo().verify_password(user_id, password).await
    }

    /// Insert a user together with its profile.
    pub async fn create_user(&self, new_user: NewUser, security: &SecurityConfig) -> Result<User> {
        let user = self.user_repo().create(new_user, security).await?;
        self.profile_repo().get_or_create(user.id).await?;
        Ok(user)
    }

    pub async fn get_or_create_profile(&self, user_id: i32) -> Result<()> {
        self.profile_repo().get_or_create(user_id).await?;
        Ok(())
    }

    pub async fn list_active_profiles(&self, offset: u64, limit: u64) -> Result<Vec<User>> {
        self.profile_repo().list_active(offset, limit).await
    }

    pub async fn count_active_profiles(&self) -> Result<u64> {
        self.profile_repo().count_active().await
    }

    pub async fn get_or_create_api_key(&self, user_id: i32) -> Result<String> {
        self.api_key_repo().get_or_create(user_id).await
    }

    pub async fn verify_api_key(&self, user_id: i32, key: &str) -> Result<bool> {
        self.api_key_repo().verify(user_id, key).await
    }
}
