use crate::db::repositories::user::fold_login;
use crate::entities::users;
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Schema, Set};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (name, column) in FOLDED_COLUMNS {
            if !manager.has_column("users", name).await? {
                manager
                    .alter_table(
                        Table::alter()
                            .table(Users::Table)
                            .add_column(
                                ColumnDef::new(column)
                                    .string()
                                    .not_null()
                                    .default(""),
                            )
                            .to_owned(),
                    )
                    .await?;
            }
        }

        // Rows written before the columns existed.
        let db = manager.get_connection();
        let stale = users::Entity::find()
            .filter(users::Column::UsernameFolded.eq(""))
            .all(db)
            .await?;

        for user in stale {
            let username_folded = fold_login(&user.username);
            let email_folded = fold_login(&user.email);

            let mut active: users::ActiveModel = user.into();
            active.username_folded = Set(username_folded);
            active.email_folded = Set(email_folded);
            active.update(db).await?;
        }

        let schema = Schema::new(manager.get_database_backend());
        for mut index in schema.create_index_from_entity(users::Entity) {
            manager.create_index(index.if_not_exists().to_owned()).await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (name, column) in FOLDED_COLUMNS {
            if manager.has_column("users", name).await? {
                manager
                    .alter_table(
                        Table::alter()
                            .table(Users::Table)
                            .drop_column(column)
                            .to_owned(),
                    )
                    .await?;
            }
        }

        Ok(())
    }
}

const FOLDED_COLUMNS: [(&str, Users); 2] = [
    ("username_folded", Users::UsernameFolded),
    ("email_folded", Users::EmailFolded),
];

#[derive(DeriveIden, Clone, Copy)]
enum Users {
    Table,
    UsernameFolded,
    EmailFolded,
}
