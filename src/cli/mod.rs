//! Command-line interface.

mod commands;

use clap::{Parser, Subcommand};

/// Example JSON API with session, Basic and API key authentication
#[derive(Parser)]
#[command(name = "api-boilerplate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    #[command(alias = "web")]
    Serve,

    /// Create default config file
    #[command(alias = "--init")]
    Init,

    /// Register a user
    CreateUser {
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// Grant staff access
        #[arg(long)]
        staff: bool,
        #[arg(long)]
        superuser: bool,
    },

    /// Print a user's API key, creating it if needed
    ApiKey {
        /// Username, or email when email logins are enabled
        login: String,
    },
}

pub use commands::*;
