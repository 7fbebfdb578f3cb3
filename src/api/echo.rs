use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;

use super::context::RequestContext;
use super::dispatch::{Endpoint, handler};
use super::response::Reply;
use super::{ApiError, AppState};

/// `/api/echo/`: returns whatever body the parser produced.
pub fn endpoint() -> Endpoint {
    Endpoint::new("echo")
        .get(handler(usage))
        .post(handler(echo))
        .put(handler(echo))
        .patch(handler(echo))
}

async fn usage(_state: Arc<AppState>, _ctx: RequestContext) -> Result<Reply, ApiError> {
    Reply::ok("POST/PUT/PATCH data to echo.")
}

async fn echo(_state: Arc<AppState>, ctx: RequestContext) -> Result<Reply, ApiError> {
    let data = ctx.data.unwrap_or_else(|| json!({}));
    Ok(Reply::new(StatusCode::OK, Some(data)))
}
