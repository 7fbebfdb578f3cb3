use std::sync::Arc;

use super::context::RequestContext;
use super::dispatch::{Endpoint, handler};
use super::guards::login_required;
use super::response::Reply;
use super::{ApiError, AppState};

/// `/api/account/`: the caller's own profile, API key included.
pub fn endpoint() -> Endpoint {
    Endpoint::new("account").get(login_required(handler(get_account)))
}

async fn get_account(state: Arc<AppState>, ctx: RequestContext) -> Result<Reply, ApiError> {
    let user = ctx
        .user()
        .ok_or_else(|| ApiError::unauthorized("Please authenticate"))?;

    let profile = state.user_service().profile(user, true).await?;
    Reply::ok(&profile)
}
