use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, RelationTrait, Set,
};
use sea_orm::sea_query::JoinType;

use super::user::User;
use crate::entities::{profiles, users};

pub struct ProfileRepository {
    conn: DatabaseConnection,
}

impl ProfileRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_by_user(&self, user_id: i32) -> Result<Option<profiles::Model>> {
        profiles::Entity::find()
            .filter(profiles::Column::UserId.eq(user_id))
            .one(&self.conn)
            .await
            .context("Failed to query profile by user")
    }

    /// Returns the user's profile, inserting it on first access.
    pub async fn get_or_create(&self, user_id: i32) -> Result<profiles::Model> {
        if let Some(profile) = self.get_by_user(user_id).await? {
            return Ok(profile);
        }

        let inserted = profiles::ActiveModel {
            user_id: Set(user_id),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        }
        .insert(&self.conn)
        .await;

        match inserted {
            Ok(profile) => Ok(profile),
            // Lost a race against a concurrent insert; the unique user_id wins.
            Err(e) => self
                .get_by_user(user_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Failed to create profile: {e}")),
        }
    }

    /// Profiles of active users ordered by user id.
    pub async fn list_active(&self, offset: u64, limit: u64) -> Result<Vec<User>> {
        let rows = profiles::Entity::find()
            .find_also_related(users::Entity)
            .filter(users::Column::IsActive.eq(true))
            .order_by_asc(users::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to list profiles")?;

        Ok(rows
            .into_iter()
            .filter_map(|(_, user)| user.map(User::from))
            .collect())
    }

    pub async fn count_active(&self) -> Result<u64> {
        profiles::Entity::find()
            .join(JoinType::InnerJoin, profiles::Relation::Users.def())
            .filter(users::Column::IsActive.eq(true))
            .count(&self.conn)
            .await
            .context("Failed to count profiles")
    }
}
