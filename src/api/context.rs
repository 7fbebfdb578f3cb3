use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, RawPathParams},
    http::{Method, request::Parts},
};
use serde_json::Value;
use tower_sessions::Session;

use super::response::RenderOptions;
use super::{ApiError, AppState};
use crate::db::User;

/// Who the authentication chain decided the request belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CurrentUser {
    #[default]
    Anonymous,
    Authenticated(User),
}

impl CurrentUser {
    #[must_use]
    pub const fn user(&self) -> Option<&User> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(user) => Some(user),
        }
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// Output of the body parser. `None` when there was no body or it failed to parse.
#[derive(Debug, Clone, Default)]
pub struct ParsedBody(pub Option<Value>);

/// Everything a view needs, assembled once the pipeline stages have run.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub user: CurrentUser,
    pub data: Option<Value>,
    pub render: RenderOptions,
    pub query: HashMap<String, String>,
    pub params: HashMap<String, String>,
    session: Option<Session>,
}

impl RequestContext {
    pub async fn from_parts(parts: &mut Parts, state: &Arc<AppState>) -> Self {
        let params = match RawPathParams::from_request_parts(parts, state).await {
            Ok(raw) => raw
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
            Err(_) => HashMap::new(),
        };

        let query = url::form_urlencoded::parse(parts.uri.query().unwrap_or_default().as_bytes())
            .into_owned()
            .collect();

        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            user: parts
                .extensions
                .get::<CurrentUser>()
                .cloned()
                .unwrap_or_default(),
            data: parts
                .extensions
                .get::<ParsedBody>()
                .and_then(|body| body.0.clone()),
            render: RenderOptions::from_uri(&parts.uri),
            query,
            params,
            session: parts.extensions.get::<Session>().cloned(),
        }
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    #[must_use]
    pub const fn user(&self) -> Option<&User> {
        self.user.user()
    }

    pub fn session(&self) -> Result<&Session, ApiError> {
        self.session
            .as_ref()
            .ok_or_else(|| ApiError::internal("Session layer is not installed"))
    }

    /// A body field as text. Numbers and booleans are stringified.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<String> {
        match self.data.as_ref()?.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// A body field read as a checkbox: JSON `true`, or one of `true`/`1`/`on`.
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.field(name)
            .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "on"))
    }
}
