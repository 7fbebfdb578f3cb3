mod api_key;
mod user;

pub use api_key::cmd_api_key;
pub use user::cmd_create_user;
