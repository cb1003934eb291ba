//! Credential and session persistence.
//!
//! The login core only sees the [`CredentialStore`] and [`SessionStore`]
//! traits. Postgres implementations back the running server; the in-memory
//! ones back tests and local runs without a database.

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::auth::{Session, SessionId};
use crate::notify::DeliveryMode;

mod live;
pub mod memory;
mod postgres;
mod sessions;

pub use live::LiveDatabase;
pub use memory::{MemoryCredentialStore, MemorySessionStore};
pub use postgres::PgCredentialStore;
pub use sessions::PgSessionStore;

/// Identity record as the login core needs it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub mobile_number: Option<String>,
    pub user_type_id: i32,
    pub is_active: bool,
}

/// Role catalog entry; `name` is the canonical key such as `__admin__`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserType {
    pub id: i32,
    pub name: String,
}

impl UserType {
    /// Human readable form of the role key: `__restaurant_owner__` -> `Restaurant Owner`.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name
            .trim_matches('_')
            .split('_')
            .filter(|word| !word.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                chars.next().map_or_else(String::new, |first| {
                    first.to_uppercase().chain(chars).collect::<String>()
                })
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// OTP request about to be written.
#[derive(Clone, Debug)]
pub struct NewOtpRequest<'a> {
    pub user_id: i64,
    pub code: &'a str,
    pub delivery_method: DeliveryMode,
    pub session_binding: &'a SessionId,
    pub requested_at: i64,
    /// `requested_at` plus the validity window, in unix seconds.
    pub valid_till: i64,
}

/// Issued OTP joined with its owner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OtpRequest {
    pub id: i64,
    pub user_id: i64,
    pub code: String,
    pub delivery_method: String,
    pub requested_at: i64,
    pub valid_till: i64,
    pub session_binding: String,
    pub user_email: String,
    pub user_type_id: i32,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Make sure the backing connection is alive, reconnecting if it is not.
    async fn ensure_live(&self) -> Result<()>;

    /// Active user with this email, if any.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_user_by_id_and_role(&self, user_id: i64, user_type_id: i32)
        -> Result<Option<User>>;

    async fn find_user_type(&self, user_type_id: i32) -> Result<Option<UserType>>;

    /// Persist an issued code; `(user, code, session)` is unique.
    async fn insert_otp_request(&self, request: &NewOtpRequest<'_>) -> Result<i64>;

    /// Code issued to `email` for `session_binding` whose deadline is still after `now`.
    async fn find_valid_otp(
        &self,
        email: &str,
        code: &str,
        session_binding: &SessionId,
        now: i64,
    ) -> Result<Option<OtpRequest>>;

    /// Stamp last login time and origin.
    async fn record_login(&self, user_id: i64, origin: Option<&str>) -> Result<()>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a live session; expired or unknown ids yield `None`.
    async fn load(&self, id: &SessionId) -> Result<Option<Session>>;

    async fn save(&self, session: &Session) -> Result<()>;
}

/// Resolve the cookie value into a session, creating a fresh one when the
/// cookie is missing, malformed, or points at nothing.
///
/// # Errors
/// Returns an error when the store fails or a new id can't be generated.
pub async fn resolve_session(store: &dyn SessionStore, raw_id: Option<&str>) -> Result<Session> {
    if let Some(id) = raw_id.and_then(SessionId::parse) {
        if let Some(session) = store.load(&id).await? {
            return Ok(session);
        }
        debug!("session cookie did not match a stored session");
    }
    Ok(Session::new(SessionId::generate()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_type_display_name() {
        let user_type = UserType {
            id: 3,
            name: "__restaurant_owner__".to_string(),
        };
        assert_eq!(user_type.display_name(), "Restaurant Owner");

        let user_type = UserType {
            id: 1,
            name: "__superadmin__".to_string(),
        };
        assert_eq!(user_type.display_name(), "Superadmin");
    }

    #[tokio::test]
    async fn resolve_session_reuses_stored_session() -> Result<()> {
        let store = MemorySessionStore::new();
        let mut session = Session::new(SessionId::generate()?);
        session.insert("theme", json!("dark"));
        store.save(&session).await?;

        let resolved = resolve_session(&store, Some(session.id().as_str())).await?;
        assert_eq!(resolved.id(), session.id());
        assert!(!resolved.is_fresh());
        assert_eq!(resolved.values().get("theme"), Some(&json!("dark")));
        Ok(())
    }

    #[tokio::test]
    async fn resolve_session_replaces_unknown_or_malformed_ids() -> Result<()> {
        let store = MemorySessionStore::new();

        let unknown = SessionId::generate()?;
        let resolved = resolve_session(&store, Some(unknown.as_str())).await?;
        assert!(resolved.is_fresh());
        assert_ne!(resolved.id(), &unknown);

        let resolved = resolve_session(&store, Some("../etc/passwd")).await?;
        assert!(resolved.is_fresh());

        let resolved = resolve_session(&store, None).await?;
        assert!(resolved.is_fresh());
        Ok(())
    }
}
