//! API key command handler

use crate::config::Config;
use crate::db::Store;
use crate::services::{AuthService, SeaOrmAuthService};

pub async fn cmd_api_key(config: &Config, login: &str) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let auth = SeaOrmAuthService::new(store, config.api.clone());

    let Some(user) = auth.resolve_user(login).await? else {
        anyhow::bail!("No user matches '{login}'");
    };

    let key = auth.get_or_create_api_key(user.id).await?;

    println!("{}: {key}", user.username);
    println!();
    println!("Send it as:");
    println!("  {}: {}", config.api.api_username_header(), user.username);
    println!("  {}: {key}", config.api.api_token_header());

    Ok(())
}
