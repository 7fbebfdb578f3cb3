use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub api: ApiConfig,

    pub pagination: PaginationConfig,

    pub security: SecurityConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/api.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Whether to set the Secure flag on session cookies.
    /// Set to false for local development without HTTPS.
    pub secure_cookies: bool,

    /// Session lifetime measured from the last request.
    pub session_expiry_minutes: i64,

    /// Largest request body the body parser will buffer.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8000,
            cors_allowed_origins: vec![
                "http://localhost:8000".to_string(),
                "http://127.0.0.1:8000".to_string(),
            ],
            secure_cookies: true,
            session_expiry_minutes: 60 * 24 * 14,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Settings read by the authentication, parsing and rendering stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Used in the Basic auth realm and in the API key header names.
    pub site_name: String,

    /// Match usernames and emails case-insensitively during login.
    pub case_insensitive_auth: bool,

    /// Fall back to the email column when no username matches.
    pub email_as_username: bool,

    /// Parse POST/PUT/PATCH bodies as JSON.
    pub parse_json_body: bool,

    /// Pretty-print every JSON response.
    pub debug: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            site_name: "Example".to_string(),
            case_insensitive_auth: true,
            email_as_username: true,
            parse_json_body: true,
            debug: false,
        }
    }
}

impl ApiConfig {
    /// `WWW-Authenticate` challenge value sent with 401 responses.
    #[must_use]
    pub fn basic_auth_challenge(&self) -> String {
        format!("Basic realm=\"{}\"", self.site_name)
    }

    /// Header carrying the login for API key authentication, e.g. `X-EXAMPLE-USERNAME`.
    #[must_use]
    pub fn api_username_header(&self) -> String {
        format!("X-{}-USERNAME", self.header_token())
    }

    /// Header carrying the API key, e.g. `X-EXAMPLE-API-TOKEN`.
    #[must_use]
    pub fn api_token_header(&self) -> String {
        format!("X-{}-API-TOKEN", self.header_token())
    }

    fn header_token(&self) -> String {
        self.site_name
            .trim()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '-'
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub default_limit: u64,

    pub max_limit: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    /// Emit log lines as JSON objects instead of the human-readable format.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            json_logs: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            api: ApiConfig::default(),
            pagination: PaginationConfig::default(),
            security: SecurityConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("api-boilerplate").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".api-boilerplate").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.site_name.trim().is_empty() {
            anyhow::bail!("api.site_name cannot be empty");
        }

        if self.api.site_name.contains('"') {
            anyhow::bail!("api.site_name cannot contain double quotes");
        }

        if !self
            .api
            .site_name
            .chars()
            .all(|c| c.is_ascii_graphic() || c == ' ')
        {
            anyhow::bail!("api.site_name must be printable ASCII");
        }

        if self.pagination.max_limit == 0 {
            anyhow::bail!("pagination.max_limit must be > 0");
        }

        if self.pagination.default_limit > self.pagination.max_limit {
            anyhow::bail!("pagination.default_limit cannot exceed pagination.max_limit");
        }

        if self.server.session_expiry_minutes <= 0 {
            anyhow::bail!("server.session_expiry_minutes must be > 0");
        }

        Ok(())
    }
}
