use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub username: String,

    pub email: String,

    /// Lowercased `username` for case-insensitive lookups.
    #[sea_orm(indexed)]
    pub username_folded: String,

    /// Lowercased `email`.
    #[sea_orm(indexed)]
    pub email_folded: String,

    /// Argon2id password hash
    pub password_hash: String,

    pub is_staff: bool,

    pub is_superuser: bool,

    pub is_active: bool,

    pub date_joined: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::profiles::Entity")]
    Profiles,
    #[sea_orm(has_one = "super::api_keys::Entity")]
    ApiKeys,
}

impl Related<super::profiles::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Profiles.def()
    }
}

impl Related<super::api_keys::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApiKeys.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
