use std::sync::Arc;

use serde::Serialize;

use super::context::RequestContext;
use super::dispatch::{Endpoint, handler};
use super::guards::staff_required;
use super::pagination::{PageMeta, Paginator};
use super::response::Reply;
use super::{ApiError, AppState};
use crate::db::NewUser;
use crate::services::{ProfileDto, UserError};

const USERS_URI: &str = "/api/users/";

#[derive(Debug, Serialize)]
pub struct ProfileList {
    pub meta: PageMeta,
    pub objects: Vec<ProfileDto>,
}

/// `/api/users/`
pub fn list_endpoint() -> Endpoint {
    Endpoint::new("users")
        .get(handler(list_users))
        .post(staff_required(handler(create_user)))
}

/// `/api/users/{user_ref}/` where `user_ref` is `self`, an id or a username.
pub fn detail_endpoint() -> Endpoint {
    Endpoint::new("user").get(handler(get_user))
}

async fn list_users(state: Arc<AppState>, ctx: RequestContext) -> Result<Reply, ApiError> {
    let paginator = Paginator::from_query(&ctx.query, USERS_URI, &state.config().pagination)?;

    let (objects, total) = state
        .user_service()
        .list_profiles(paginator.offset(), paginator.limit())
        .await?;

    Reply::ok(&ProfileList {
        meta: paginator.meta(total),
        objects,
    })
}

async fn create_user(state: Arc<AppState>, ctx: RequestContext) -> Result<Reply, ApiError> {
    let required = |name: &str| {
        ctx.field(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::bad_request(format!("Missing required field '{name}'")))
    };

    let new_user = NewUser {
        username: required("username")?,
        email: required("email")?,
        password: required("password")?,
        is_staff: ctx.flag("is_staff"),
        is_superuser: false,
    };

    let user = state.user_service().create_user(new_user).await?;
    let profile = state.user_service().profile(&user, false).await?;

    Reply::created(&profile, &profile.resource_uri)
}

async fn get_user(state: Arc<AppState>, ctx: RequestContext) -> Result<Reply, ApiError> {
    let user_ref = ctx.param("user_ref").unwrap_or_default();

    let user = if user_ref == "self" {
        ctx.user()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Please authenticate"))?
    } else {
        state
            .user_service()
            .lookup(user_ref)
            .await?
            .ok_or(UserError::NotFound)?
    };

    let profile = state.user_service().profile(&user, false).await?;
    Reply::ok(&profile)
}
