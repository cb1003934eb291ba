use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::{client_ip, load_session, with_session_cookie};
use crate::auth::LoginOutcome;
use crate::bitebuddy::{
    render::{self, LoginPage},
    AppState,
};

#[derive(Deserialize, Debug, Default)]
pub struct LoginForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    otp: String,
}

// axum handler for the login form
pub async fn login_page(headers: HeaderMap, state: Extension<Arc<AppState>>) -> Response {
    let mut session = match load_session(&state, &headers).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    let response = if state.guard.is_authenticated(&mut session).await {
        Redirect::to("/").into_response()
    } else {
        Html(render::login(&LoginPage::default())).into_response()
    };

    with_session_cookie(&state.config, &session, response)
}

// axum handler for login submissions
#[instrument(skip_all)]
pub async fn login(
    headers: HeaderMap,
    state: Extension<Arc<AppState>>,
    Form(form): Form<LoginForm>,
) -> Response {
    let mut session = match load_session(&state, &headers).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    if state.guard.is_authenticated(&mut session).await {
        return with_session_cookie(&state.config, &session, Redirect::to("/").into_response());
    }

    let origin = client_ip(&headers);
    let email = form.email.trim();

    let response = match state
        .authenticator
        .handle_login_submission(email, &form.otp, &mut session, origin.as_deref())
        .await
    {
        Ok(LoginOutcome::Authenticated {
            user_id,
            user_type_id,
        }) => {
            info!(user_id, user_type_id, "login succeeded");
            Redirect::to("/").into_response()
        }
        Ok(LoginOutcome::CodeIssued { email }) => {
            let page = LoginPage {
                email: &email,
                notice: Some("A one-time code has been sent"),
                error: None,
            };
            (StatusCode::UNAUTHORIZED, Html(render::login(&page))).into_response()
        }
        Ok(LoginOutcome::Rejected { email, reason }) => {
            let page = LoginPage {
                email: email.as_deref().unwrap_or_default(),
                notice: None,
                error: Some(reason.message()),
            };
            (StatusCode::UNAUTHORIZED, Html(render::login(&page))).into_response()
        }
        Err(err) => {
            error!("Login failed: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    };

    with_session_cookie(&state.config, &session, response)
}

// axum handler for logout
pub async fn logout(headers: HeaderMap, state: Extension<Arc<AppState>>) -> Response {
    let mut session = match load_session(&state, &headers).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    match state.guard.logout(&mut session).await {
        Ok(()) => with_session_cookie(
            &state.config,
            &session,
            Redirect::to("/login").into_response(),
        ),
        Err(err) => {
            error!("Logout failed: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}
