//! Request authentication.
//!
//! A [`StrategyChain`] runs its strategies in order for every request. Each
//! strategy either authenticates the request (ending the chain), defers to the
//! next one by returning `Ok(None)`, or rejects the request with a 401.
//!
//! The standard chain is session cookie, then HTTP Basic, then the API key
//! header pair.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{HeaderName, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use base64::{Engine, engine::general_purpose::STANDARD};
use tower_sessions::Session;
use tracing::{debug, info, warn};

use super::context::{CurrentUser, RequestContext};
use super::dispatch::{Endpoint, handler};
use super::response::{RenderOptions, Reply};
use super::{ApiError, AppState};
use crate::config::ApiConfig;
use crate::db::User;
use crate::services::AuthService;

/// Session key holding the authenticated user's id.
pub const SESSION_USER_KEY: &str = "user_id";

const BASIC_AUTH_ERROR: &str = "Error with HTTP Basic Auth";
const BASIC_AUTH_FORMAT_ERROR: &str = "Invalid Authorization header. Value should be \"Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==\" where base64 encoded part is encrypted from \"username:password\"";

#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Label used in logs and the `auth_failures_total` metric.
    fn name(&self) -> &'static str;

    async fn authenticate(&self, parts: &Parts) -> Result<Option<User>, ApiError>;
}

/// Restores the user stored in the session by [`login`]. Never rejects.
pub struct SessionStrategy {
    auth: Arc<dyn AuthService>,
}

impl SessionStrategy {
    #[must_use]
    pub fn new(auth: Arc<dyn AuthService>) -> Self {
        Self { auth }
    }
}

#[async_trait]
impl AuthStrategy for SessionStrategy {
    fn name(&self) -> &'static str {
        "session"
    }

    async fn authenticate(&self, parts: &Parts) -> Result<Option<User>, ApiError> {
        let Some(session) = parts.extensions.get::<Session>() else {
            return Ok(None);
        };

        let user_id = match session.get::<i32>(SESSION_USER_KEY).await {
            Ok(Some(id)) => id,
            Ok(None) => return Ok(None),
            Err(e) => {
                debug!(error = %e, "Unreadable session");
                return Ok(None);
            }
        };

        match self.auth.session_user(user_id).await {
            Ok(user) => Ok(user),
            Err(e) => {
                warn!(user_id, error = %e, "Failed to load session user");
                Ok(None)
            }
        }
    }
}

/// `Authorization: Basic <base64(login:password)>`.
pub struct BasicAuthStrategy {
    auth: Arc<dyn AuthService>,
}

impl BasicAuthStrategy {
    #[must_use]
    pub fn new(auth: Arc<dyn AuthService>) -> Self {
        Self { auth }
    }
}

#[async_trait]
impl AuthStrategy for BasicAuthStrategy {
    fn name(&self) -> &'static str {
        "basic"
    }

    async fn authenticate(&self, parts: &Parts) -> Result<Option<User>, ApiError> {
        let Some(header) = parts.headers.get(AUTHORIZATION) else {
            return Ok(None);
        };

        let (login, password) = parse_basic_credentials(header.as_bytes())?;
        let user = self.auth.authenticate_password(&login, &password).await?;

        Ok(Some(user))
    }
}

/// Splits a Basic `Authorization` header value into login and password.
pub fn parse_basic_credentials(value: &[u8]) -> Result<(String, String), ApiError> {
    let value = std::str::from_utf8(value).map_err(|_| ApiError::unauthorized(BASIC_AUTH_ERROR))?;

    let mut tokens = value.split_whitespace();
    let (Some("Basic"), Some(encoded), None) = (tokens.next(), tokens.next(), tokens.next())
    else {
        return Err(ApiError::unauthorized(BASIC_AUTH_ERROR));
    };

    let decoded = STANDARD
        .decode(encoded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| ApiError::unauthorized(BASIC_AUTH_ERROR))?;

    let (login, password) = decoded
        .split_once(':')
        .ok_or_else(|| ApiError::unauthorized(BASIC_AUTH_FORMAT_ERROR))?;

    Ok((login.to_string(), password.to_string()))
}

/// `X-<SITE>-USERNAME` + `X-<SITE>-API-TOKEN`. Runs only when both are non-empty.
pub struct ApiKeyStrategy {
    auth: Arc<dyn AuthService>,
    username_header: HeaderName,
    token_header: HeaderName,
}

impl ApiKeyStrategy {
    pub fn new(auth: Arc<dyn AuthService>, api: &ApiConfig) -> anyhow::Result<Self> {
        Ok(Self {
            auth,
            username_header: HeaderName::from_bytes(api.api_username_header().as_bytes())?,
            token_header: HeaderName::from_bytes(api.api_token_header().as_bytes())?,
        })
    }
}

#[async_trait]
impl AuthStrategy for ApiKeyStrategy {
    fn name(&self) -> &'static str {
        "api_key"
    }

    async fn authenticate(&self, parts: &Parts) -> Result<Option<User>, ApiError> {
        let (Some(username), Some(token)) = (
            parts.headers.get(&self.username_header),
            parts.headers.get(&self.token_header),
        ) else {
            return Ok(None);
        };

        if username.is_empty() || token.is_empty() {
            return Ok(None);
        }

        let (Ok(username), Ok(token)) = (username.to_str(), token.to_str()) else {
            return Err(ApiError::unauthorized(
                crate::services::AuthError::InvalidApiKey.to_string(),
            ));
        };

        let user = self.auth.authenticate_api_key(username, token).await?;
        Ok(Some(user))
    }
}

pub struct StrategyChain {
    strategies: Vec<Box<dyn AuthStrategy>>,
}

impl StrategyChain {
    #[must_use]
    pub fn new(strategies: Vec<Box<dyn AuthStrategy>>) -> Self {
        Self { strategies }
    }

    /// Session, then Basic, then API key.
    pub fn standard(auth: &Arc<dyn AuthService>, api: &ApiConfig) -> anyhow::Result<Self> {
        Ok(Self::new(vec![
            Box::new(SessionStrategy::new(auth.clone())),
            Box::new(BasicAuthStrategy::new(auth.clone())),
            Box::new(ApiKeyStrategy::new(auth.clone(), api)?),
        ]))
    }

    pub async fn authenticate(&self, parts: &Parts) -> Result<CurrentUser, ApiError> {
        for strategy in &self.strategies {
            match strategy.authenticate(parts).await {
                Ok(Some(user)) => {
                    debug!(strategy = strategy.name(), user_id = user.id, "Request authenticated");
                    return Ok(CurrentUser::Authenticated(user));
                }
                Ok(None) => {}
                Err(err) => {
                    metrics::counter!("auth_failures_total", "strategy" => strategy.name())
                        .increment(1);
                    info!(strategy = strategy.name(), error = %err, "Authentication failed");
                    return Err(err);
                }
            }
        }

        Ok(CurrentUser::Anonymous)
    }
}

/// Runs the strategy chain and stores the outcome as a [`CurrentUser`] extension.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();

    match state.strategies.authenticate(&parts).await {
        Ok(current) => {
            if let Some(user) = current.user() {
                tracing::Span::current().record("user_id", user.id);
            }
            parts.extensions.insert(current);
            next.run(Request::from_parts(parts, body)).await
        }
        Err(err) => state
            .renderer
            .render_error(&RenderOptions::from_uri(&parts.uri), &err),
    }
}

/// `/api/auth/login/`
pub fn login_endpoint() -> Endpoint {
    Endpoint::new("login").post(handler(login))
}

/// `/api/auth/logout/`
pub fn logout_endpoint() -> Endpoint {
    Endpoint::new("logout").post(handler(logout))
}

async fn login(state: Arc<AppState>, ctx: RequestContext) -> Result<Reply, ApiError> {
    let (Some(username), Some(password)) = (ctx.field("username"), ctx.field("password")) else {
        return Err(ApiError::bad_request("Username and password are required"));
    };

    let user = state
        .auth_service()
        .authenticate_password(&username, &password)
        .await?;

    let session = ctx.session()?;
    session
        .cycle_id()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to rotate session: {e}")))?;
    session
        .insert(SESSION_USER_KEY, user.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create session: {e}")))?;

    info!(user_id = user.id, "User logged in");

    let profile = state.user_service().profile(&user, true).await?;
    Reply::ok(&profile)
}

async fn logout(_state: Arc<AppState>, ctx: RequestContext) -> Result<Reply, ApiError> {
    ctx.session()?
        .flush()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to end session: {e}")))?;

    Ok(Reply::no_content())
}
