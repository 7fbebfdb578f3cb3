use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use sha1::Sha1;
use subtle::ConstantTimeEq;

use crate::entities::api_keys;

type HmacSha1 = Hmac<Sha1>;

pub struct ApiKeyRepository {
    conn: DatabaseConnection,
}

impl ApiKeyRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    async fn get_by_user(&self, user_id: i32) -> Result<Option<api_keys::Model>> {
        api_keys::Entity::find()
            .filter(api_keys::Column::UserId.eq(user_id))
            .one(&self.conn)
            .await
            .context("Failed to query API key by user")
    }

    /// Returns the user's key, generating it on first call. The stored key never changes.
    pub async fn get_or_create(&self, user_id: i32) -> Result<String> {
        if let Some(existing) = self.get_by_user(user_id).await? {
            return Ok(existing.key);
        }

        let inserted = api_keys::ActiveModel {
            user_id: Set(user_id),
            key: Set(generate_api_key()),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        }
        .insert(&self.conn)
        .await;

        match inserted {
            Ok(model) => Ok(model.key),
            Err(e) => self
                .get_by_user(user_id)
                .await?
                .map(|m| m.key)
                .ok_or_else(|| anyhow::anyhow!("Failed to create API key: {e}")),
        }
    }

    /// Whether `key` is the key stored for `user_id`.
    pub async fn verify(&self, user_id: i32, key: &str) -> Result<bool> {
        Ok(self
            .get_by_user(user_id)
            .await?
            .is_some_and(|stored| keys_match(&stored.key, key)))
    }
}

/// Constant-time comparison; only the length can short-circuit.
fn keys_match(stored: &str, presented: &str) -> bool {
    stored.as_bytes().ct_eq(presented.as_bytes()).into()
}

/// Generate a new API key: hex HMAC-SHA1 keyed by a random UUID (40 characters).
#[must_use]
pub fn generate_api_key() -> String {
    let seed = uuid::Uuid::new_v4().to_string();

    #[allow(clippy::expect_used)] // HMAC accepts any key size, this cannot fail
    let mac = HmacSha1::new_from_slice(seed.as_bytes()).expect("HMAC can take key of any size");

    hex::encode(mac.finalize().into_bytes())
}
