use crate::{
    auth::{AuthConfig, Authenticator, Clock, Guard},
    notify::Notifier,
    store::{CredentialStore, SessionStore},
};
use anyhow::Result;
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware,
    routing::get,
    Extension, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{debug_span, info, Span};
use ulid::Ulid;

pub mod handlers;
mod render;

/// Collaborators shared by every handler.
pub struct AppState {
    pub authenticator: Authenticator,
    pub guard: Guard,
    pub credentials: Arc<dyn CredentialStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub config: AuthConfig,
}

impl AppState {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        notifier: Arc<dyn Notifier>,
        config: AuthConfig,
    ) -> Self {
        let authenticator = Authenticator::new(
            credentials.clone(),
            sessions.clone(),
            notifier,
            config.clone(),
        );
        let guard = Guard::new(
            credentials.clone(),
            sessions.clone(),
            config.admin_user_type_id(),
        );
        Self {
            authenticator,
            guard,
            credentials,
            sessions,
            config,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.authenticator = self.authenticator.with_clock(clock);
        self
    }
}

/// Login, logout and health are public; `/` needs a session and `/admin`
/// needs the admin role.
pub fn router(state: Arc<AppState>) -> Router {
    let members = Router::new()
        .route("/", get(handlers::dashboard))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::require_auth,
        ));

    let admins = Router::new()
        .route("/admin", get(handlers::admin))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::require_admin,
        ));

    Router::new()
        .route("/login", get(handlers::login_page).post(handlers::login))
        .route("/logout", get(handlers::logout))
        .route("/health", get(handlers::health))
        .merge(members)
        .merge(admins)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(state)),
        )
}

/// Serve the dashboard on `port` until the process is stopped.
///
/// # Errors
/// Returns an error if the listener can't be bound or the server fails
pub async fn new(port: u16, state: Arc<AppState>) -> Result<()> {
    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let path = request.uri().path();
    let method = request.method().as_str();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    // headers carry the session cookie; keep them out of the span
    debug_span!("http.request", method, path, request_id)
}
