use std::sync::Arc;

use futures::future::FutureExt;

use super::context::{CurrentUser, RequestContext};
use super::dispatch::{Handler, HandlerFuture};
use super::{ApiError, AppState};

const AUTH_REQUIRED: &str = "Please authenticate";

/// Wraps `inner` so it only runs when `allowed` accepts the current user.
pub fn guard<P>(allowed: P, inner: Handler) -> Handler
where
    P: Fn(&CurrentUser) -> bool + Send + Sync + 'static,
{
    Arc::new(move |state: Arc<AppState>, ctx: RequestContext| -> HandlerFuture {
        if allowed(&ctx.user) {
            inner(state, ctx)
        } else {
            async { Err(ApiError::unauthorized(AUTH_REQUIRED)) }.boxed()
        }
    })
}

#[must_use]
pub const fn is_authenticated(user: &CurrentUser) -> bool {
    user.is_authenticated()
}

#[must_use]
pub const fn is_staff(user: &CurrentUser) -> bool {
    match user.user() {
        Some(user) => user.has_staff_access(),
        None => false,
    }
}

pub fn login_required(inner: Handler) -> Handler {
    guard(is_authenticated, inner)
}

/// Staff or superuser.
pub fn staff_required(inner: Handler) -> Handler {
    guard(is_staff, inner)
}
