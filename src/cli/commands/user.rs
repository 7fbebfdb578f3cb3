//! Create user command handler

use crate::config::Config;
use crate::db::{NewUser, Store};
use crate::services::{SeaOrmUserService, UserService};

pub async fn cmd_create_user(config: &Config, new_user: NewUser) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let service = SeaOrmUserService::new(store, config.security.clone());

    let user = service.create_user(new_user).await?;

    println!("✓ Created user '{}' (ID: {})", user.username, user.id);
    if user.has_staff_access() {
        println!("  Staff access: yes");
    }

    Ok(())
}
