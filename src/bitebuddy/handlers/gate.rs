//! Route gating middleware.
//!
//! Unauthenticated callers are sent to `/login`. A caller that is logged in
//! but lacks the admin role gets an explicit 403 instead of a redirect loop.
//! On success the checked [`crate::auth::Session`] is handed to the handler
//! through the request extensions.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tracing::debug;

use super::{load_session, with_session_cookie};
use crate::auth::Standing;
use crate::bitebuddy::AppState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Access {
    Member,
    Admin,
}

pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    gate(&state, Access::Member, request, next).await
}

pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    gate(&state, Access::Admin, request, next).await
}

async fn gate(state: &AppState, access: Access, mut request: Request, next: Next) -> Response {
    let mut session = match load_session(state, request.headers()).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    let standing = state.guard.standing(&mut session).await;
    let allowed = match access {
        Access::Member => standing != Standing::Anonymous,
        Access::Admin => standing == Standing::Admin,
    };

    if allowed {
        request.extensions_mut().insert(session);
        return next.run(request).await;
    }

    let path = request.uri().path().to_owned();
    if standing == Standing::Member {
        debug!(%path, "admin route refused for non-admin session");
        return (StatusCode::FORBIDDEN, "Forbidden: Admins only").into_response();
    }

    debug!(%path, "redirecting unauthenticated request to login");
    with_session_cookie(
        &state.config,
        &session,
        Redirect::to("/login").into_response(),
    )
}
