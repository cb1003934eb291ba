use axum::{
    extract::Extension,
    response::{Html, IntoResponse, Response},
};
use std::sync::Arc;
use tracing::error;

use crate::auth::Session;
use crate::bitebuddy::{render, AppState};

// axum handler for the dashboard landing page, behind `require_auth`
pub async fn dashboard(state: Extension<Arc<AppState>>, session: Extension<Session>) -> Response {
    landing(&state, &session, "BiteBuddy Dashboard").await
}

// axum handler for the admin landing page, behind `require_admin`
pub async fn admin(state: Extension<Arc<AppState>>, session: Extension<Session>) -> Response {
    landing(&state, &session, "BiteBuddy Admin").await
}

async fn landing(state: &AppState, session: &Session, title: &str) -> Response {
    let claims = session.claims();
    let user_id = claims.user_id.value().unwrap_or_default();
    let user_type_id = claims.user_type_id.value().unwrap_or_default();

    let role = match state.credentials.find_user_type(user_type_id).await {
        Ok(Some(user_type)) => user_type.display_name(),
        Ok(None) => "Unknown".to_string(),
        Err(err) => {
            error!("Failed to look up user type {user_type_id}: {err:#}");
            "Unknown".to_string()
        }
    };

    Html(render::landing(title, &role, user_id)).into_response()
}
