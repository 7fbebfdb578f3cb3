pub mod api_key;
pub mod profile;
pub mod user;
