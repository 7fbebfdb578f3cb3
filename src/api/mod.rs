use axum::{
    Router,
    extract::State,
    http::HeaderValue,
    middleware,
    response::Response,
    routing::get,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};

use crate::config::Config;
use crate::services::{AuthService, UserService};
use crate::state::SharedState;

mod account;
pub mod auth;
pub mod body;
pub mod context;
pub mod dispatch;
mod echo;
mod error;
pub mod guards;
mod observability;
pub mod pagination;
pub mod response;
mod users;

pub use context::{CurrentUser, ParsedBody, RequestContext};
pub use dispatch::{Endpoint, Handler, handler};
pub use error::ApiError;
pub use response::{RenderOptions, Renderer, Reply};

use auth::StrategyChain;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub strategies: Arc<StrategyChain>,

    pub renderer: Renderer,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }

    #[must_use]
    pub fn auth_service(&self) -> &Arc<dyn AuthService> {
        &self.shared.auth_service
    }

    #[must_use]
    pub fn user_service(&self) -> &Arc<dyn UserService> {
        &self.shared.user_service
    }
}

pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let strategies = StrategyChain::standard(&shared.auth_service, &shared.config.api)?;
    let renderer = Renderer::new(&shared.config.api);

    Ok(Arc::new(AppState {
        shared,
        strategies: Arc::new(strategies),
        renderer,
        prometheus_handle,
    }))
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    create_app_state(shared, prometheus_handle)
}

pub fn router(state: Arc<AppState>) -> Router {
    let server = state.config().server.clone();

    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(server.secure_cookies)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            server.session_expiry_minutes,
        )));

    // Outermost first: session, authentication, body parsing.
    let api_router = Router::new()
        .merge(endpoint_routes("/echo", echo::endpoint()))
        .merge(endpoint_routes("/account", account::endpoint()))
        .merge(endpoint_routes("/users", users::list_endpoint()))
        .merge(endpoint_routes("/users/{user_ref}", users::detail_endpoint()))
        .merge(endpoint_routes("/auth/login", auth::login_endpoint()))
        .merge(endpoint_routes("/auth/logout", auth::logout_endpoint()))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), body::parse_body))
        .layer(middleware::from_fn_with_state(state.clone(), auth::authenticate))
        .layer(session_layer);

    let app = Router::new()
        .nest("/api", api_router)
        .route("/metrics", get(observability::get_metrics))
        .fallback(not_found)
        .with_state(state)
        .layer(middleware::from_fn(observability::logging_middleware))
        .layer(TraceLayer::new_for_http());

    match cors_layer(&server.cors_allowed_origins) {
        Some(cors) => app.layer(cors),
        None => app,
    }
}

/// No configured origins means no CORS handling at all.
fn cors_layer(allowed_origins: &[String]) -> Option<CorsLayer> {
    if allowed_origins.is_empty() {
        return None;
    }

    let layer = if allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(origins)
    };

    Some(layer.allow_methods(Any).allow_headers(Any))
}

/// Routes `path` with and without a trailing slash.
fn endpoint_routes(path: &str, endpoint: Endpoint) -> Router<Arc<AppState>> {
    let method_router = dispatch::serve(endpoint);

    Router::new()
        .route(path, method_router.clone())
        .route(&format!("{path}/"), method_router)
}

async fn not_found(State(state): State<Arc<AppState>>, render: RenderOptions) -> Response {
    state
        .renderer
        .render_error(&render, &ApiError::not_found("Not found."))
}
