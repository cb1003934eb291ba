use std::sync::Arc;
use tracing::{debug, error};

use super::{AuthError, Session, Trust};
use crate::store::{CredentialStore, SessionStore};

/// Who a session turned out to be after re-validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Standing {
    Anonymous,
    Member,
    Admin,
}

/// Trust decisions for protected routes.
///
/// Session claims are only a hint: a complete, logged-in set of claims is
/// re-checked against the credential store on every call, so a deleted user or
/// a changed role stops being trusted immediately.
pub struct Guard {
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    admin_user_type_id: i32,
}

impl Guard {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        admin_user_type_id: i32,
    ) -> Self {
        Self {
            credentials,
            sessions,
            admin_user_type_id,
        }
    }

    #[must_use]
    pub fn admin_user_type_id(&self) -> i32 {
        self.admin_user_type_id
    }

    /// Is this session logged in as a user that still exists with its role?
    pub async fn is_authenticated(&self, session: &mut Session) -> bool {
        self.check(session, None).await
    }

    /// Like [`Guard::is_authenticated`], and the role must be the admin role.
    /// A non-admin role is refused before the store is queried.
    pub async fn is_privileged(&self, session: &mut Session) -> bool {
        self.check(session, Some(self.admin_user_type_id)).await
    }

    /// Resolve the session once: normalize, then one store check at most.
    /// Callers that must tell "not logged in" from "not an admin" use this
    /// instead of chaining [`Guard::is_privileged`] and [`Guard::is_authenticated`].
    pub async fn standing(&self, session: &mut Session) -> Standing {
        match self.verified_user_type(session, None).await {
            None => Standing::Anonymous,
            Some(user_type_id) if user_type_id == self.admin_user_type_id => Standing::Admin,
            Some(_) => Standing::Member,
        }
    }

    /// Drop the auth claims and persist the session.
    ///
    /// # Errors
    /// Returns [`AuthError::Session`] if the session can't be saved; the
    /// in-memory session is logged out either way.
    pub async fn logout(&self, session: &mut Session) -> Result<(), AuthError> {
        session.clear_claims();
        self.sessions.save(session).await.map_err(|err| {
            error!("failed to persist logout for session {}: {err:#}", session.id());
            AuthError::Session(err)
        })
    }

    async fn check(&self, session: &mut Session, required_user_type: Option<i32>) -> bool {
        self.verified_user_type(session, required_user_type)
            .await
            .is_some()
    }

    /// The role of the user behind the session, if the store confirms it.
    async fn verified_user_type(
        &self,
        session: &mut Session,
        required_user_type: Option<i32>,
    ) -> Option<i32> {
        self.normalize(session).await;

        let Trust::Verify {
            user_id,
            user_type_id,
        } = session.claims().trust(required_user_type)
        else {
            return None;
        };

        if let Err(err) = self.credentials.ensure_live().await {
            error!("credential store unavailable during session check: {err:#}");
            return None;
        }

        match self
            .credentials
            .find_user_by_id_and_role(user_id, user_type_id)
            .await
        {
            Ok(Some(_)) => Some(user_type_id),
            Ok(None) => {
                debug!(user_id, user_type_id, "session claims no longer match a user");
                None
            }
            Err(err) => {
                error!("failed to re-validate session claims: {err:#}");
                None
            }
        }
    }

    /// Write defaults over broken claims and persist them. Fresh sessions are
    /// saved here too so the id handed to the client exists server-side.
    async fn normalize(&self, session: &mut Session) {
        if !session.normalize() && !session.is_fresh() {
            return;
        }
        if let Err(err) = self.sessions.save(session).await {
            error!("failed to persist normalized session {}: {err:#}", session.id());
        }
    }
}
