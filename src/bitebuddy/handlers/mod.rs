pub mod gate;
pub use self::gate::{require_admin, require_auth};

pub mod health;
pub use self::health::health;

pub mod login;
pub use self::login::{login, login_page, logout};

pub mod pages;
pub use self::pages::{admin, dashboard};

// common functions for the handlers
use crate::auth::{AuthConfig, Session};
use crate::bitebuddy::AppState;
use crate::store::resolve_session;
use axum::{
    http::{
        header::{InvalidHeaderValue, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
};
use tracing::error;

/// Session for this request; unknown or malformed cookies get a fresh one.
pub(crate) async fn load_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Session, Response> {
    let raw = extract_cookie(headers, state.config.session_name());
    resolve_session(state.sessions.as_ref(), raw.as_deref())
        .await
        .map_err(|err| {
            error!("Failed to load session: {err:#}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

/// Attach the session cookie when the session was created on this request.
pub(crate) fn with_session_cookie(
    config: &AuthConfig,
    session: &Session,
    mut response: Response,
) -> Response {
    if !session.is_fresh() {
        return response;
    }
    match session_cookie(config, session) {
        Ok(cookie) => {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build session cookie: {err}"),
    }
    response
}

pub(crate) fn session_cookie(
    config: &AuthConfig,
    session: &Session,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        config.session_name(),
        session.id(),
        config.session_ttl_seconds()
    );
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            if key.trim() == name {
                return Some(val.trim().to_string());
            }
        }
    }
    None
}

/// Client address as reported by the fronting proxy.
pub(crate) fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
        })
        .map(str::to_string)
}
