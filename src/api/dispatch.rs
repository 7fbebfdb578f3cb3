//! Verb dispatch for class-style endpoints.
//!
//! An [`Endpoint`] maps HTTP methods to handlers. Requests for a method the
//! endpoint does not implement get a 405. `HEAD` falls back to the `GET`
//! handler and `OPTIONS` lists the allowed methods unless overridden.

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, Method, StatusCode, header::ALLOW},
    response::Response,
    routing::{MethodRouter, any},
};
use futures::future::{BoxFuture, FutureExt};
use tracing::warn;

use super::context::RequestContext;
use super::response::Reply;
use super::{ApiError, AppState};

pub type HandlerFuture = BoxFuture<'static, Result<Reply, ApiError>>;

pub type Handler = Arc<dyn Fn(Arc<AppState>, RequestContext) -> HandlerFuture + Send + Sync>;

const RECOGNIZED_METHODS: [Method; 8] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::HEAD,
    Method::OPTIONS,
    Method::TRACE,
];

/// Boxes an async fn into a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Arc<AppState>, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Reply, ApiError>> + Send + 'static,
{
    Arc::new(move |state, ctx| f(state, ctx).boxed())
}

#[derive(Clone)]
pub struct Endpoint {
    name: &'static str,
    handlers: Vec<(Method, Handler)>,
}

impl Endpoint {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            handlers: Vec::new(),
        }
    }

    /// Registers `handler` for `method`, replacing any previous one.
    #[must_use]
    pub fn on(mut self, method: Method, handler: Handler) -> Self {
        self.handlers.retain(|(m, _)| *m != method);
        self.handlers.push((method, handler));
        self
    }

    #[must_use]
    pub fn get(self, handler: Handler) -> Self {
        self.on(Method::GET, handler)
    }

    #[must_use]
    pub fn post(self, handler: Handler) -> Self {
        self.on(Method::POST, handler)
    }

    #[must_use]
    pub fn put(self, handler: Handler) -> Self {
        self.on(Method::PUT, handler)
    }

    #[must_use]
    pub fn patch(self, handler: Handler) -> Self {
        self.on(Method::PATCH, handler)
    }

    #[must_use]
    pub fn delete(self, handler: Handler) -> Self {
        self.on(Method::DELETE, handler)
    }

    /// Methods this endpoint answers, including the implicit `HEAD` and `OPTIONS`.
    #[must_use]
    pub fn allowed_methods(&self) -> Vec<Method> {
        let mut methods: Vec<Method> = self.handlers.iter().map(|(m, _)| m.clone()).collect();

        if self.find(&Method::GET).is_some() && !methods.contains(&Method::HEAD) {
            methods.push(Method::HEAD);
        }
        if !methods.contains(&Method::OPTIONS) {
            methods.push(Method::OPTIONS);
        }

        methods
    }

    fn allow_header(&self) -> Option<HeaderValue> {
        let allow = self
            .allowed_methods()
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        HeaderValue::from_str(&allow).ok()
    }

    fn find(&self, method: &Method) -> Option<&Handler> {
        self.handlers
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, handler)| handler)
    }

    fn resolve(&self, method: &Method) -> Option<&Handler> {
        if !RECOGNIZED_METHODS.contains(method) {
            return None;
        }

        self.find(method).or_else(|| {
            if *method == Method::HEAD {
                self.find(&Method::GET)
            } else {
                None
            }
        })
    }

    /// Runs the handler for the request's method and renders the result.
    pub async fn dispatch(&self, state: Arc<AppState>, request: Request) -> Response {
        let (mut parts, _body) = request.into_parts();
        let ctx = RequestContext::from_parts(&mut parts, &state).await;
        let render = ctx.render.clone();

        let reply = match self.resolve(&ctx.method) {
            Some(handler) => handler(state.clone(), ctx).await,
            None if ctx.method == Method::OPTIONS => Ok(self.options()),
            None => Ok(self.method_not_allowed(&ctx)),
        };

        match reply {
            Ok(reply) => state.renderer.render(&render, reply),
            Err(err) => state.renderer.render_error(&render, &err),
        }
    }

    fn options(&self) -> Reply {
        let reply = Reply::new(StatusCode::OK, None);
        match self.allow_header() {
            Some(allow) => reply.header(ALLOW, allow),
            None => reply,
        }
    }

    fn method_not_allowed(&self, ctx: &RequestContext) -> Reply {
        warn!(
            endpoint = self.name,
            method = %ctx.method,
            path = %ctx.path,
            status_code = 405,
            "Method Not Allowed ({}): {}",
            ctx.method,
            ctx.path
        );

        let reply = ApiError::MethodNotAllowed(ctx.method.clone()).to_reply();
        match self.allow_header() {
            Some(allow) => reply.header(ALLOW, allow),
            None => reply,
        }
    }
}

/// Mounts an endpoint on every method of a route.
pub fn serve(endpoint: Endpoint) -> MethodRouter<Arc<AppState>> {
    let endpoint = Arc::new(endpoint);

    any(move |State(state): State<Arc<AppState>>, request: Request| {
        let endpoint = endpoint.clone();
        async move { endpoint.dispatch(state, request).await }
    })
}
