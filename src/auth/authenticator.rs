//! Login challenge/response.
//!
//! Flow Overview:
//! 1. The submitted email must resolve to one active user, else `Invalid email`.
//! 2. An empty code means "send me a code": generate, persist bound to the
//!    caller's session, then dispatch. The row is written before anything is sent.
//! 3. A code shorter than the configured length is refused without a lookup.
//! 4. Otherwise the code must match an OTP request for that email, issued for
//!    this session, whose deadline is still ahead. Wrong, expired and
//!    foreign-session codes all read as `Invalid Credentials`.
//! 5. On a match the session is promoted and saved; that save is the last step.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

use super::{otp, AuthConfig, AuthError, Clock, Session, SessionId, SystemClock};
use crate::notify::{DeliveryMode, Notifier};
use crate::store::{CredentialStore, NewOtpRequest, SessionStore, User};

/// User-facing reason a login step was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// No active user has the submitted email.
    InvalidEmail,
    /// The code is shorter than any issued code can be.
    IllegalCredentials,
    /// No live OTP matches email, code and session.
    InvalidCredentials,
}

impl Rejection {
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::InvalidEmail => "Invalid email",
            Self::IllegalCredentials => "Illegal credentials",
            Self::InvalidCredentials => "Invalid Credentials",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginOutcome {
    /// A code went out; ask for it with the email pre-filled.
    CodeIssued { email: String },
    Rejected {
        /// Email to pre-fill, known once the identity step succeeded.
        email: Option<String>,
        reason: Rejection,
    },
    Authenticated { user_id: i64, user_type_id: i32 },
}

pub struct Authenticator {
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: AuthConfig,
}

impl Authenticator {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        notifier: Arc<dyn Notifier>,
        config: AuthConfig,
    ) -> Self {
        Self {
            credentials,
            sessions,
            notifier,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Process one login form submission for `session`.
    ///
    /// `origin` is the client address recorded on successful login.
    ///
    /// # Errors
    /// Returns [`AuthError`] for infrastructure failures only; bad input is an
    /// [`LoginOutcome::Rejected`].
    #[instrument(skip_all, fields(session = %session.id()))]
    pub async fn handle_login_submission(
        &self,
        email: &str,
        code: &str,
        session: &mut Session,
        origin: Option<&str>,
    ) -> Result<LoginOutcome, AuthError> {
        let code_length = self.config.otp_length();
        debug!(code_length, "processing login submission");

        let Some(user) = self.begin(email).await? else {
            return Ok(LoginOutcome::Rejected {
                email: None,
                reason: Rejection::InvalidEmail,
            });
        };

        self.verify_code(&user, code, session, code_length, origin)
            .await
    }

    /// Resolve the submitted identity to a user.
    ///
    /// # Errors
    /// Returns [`AuthError::Store`] if the credential store fails.
    pub async fn begin(&self, email: &str) -> Result<Option<User>, AuthError> {
        self.credentials.ensure_live().await.map_err(AuthError::Store)?;
        let user = self
            .credentials
            .find_user_by_email(email)
            .await
            .map_err(AuthError::Store)?;

        if user.is_none() {
            debug!("no active user for submitted email");
        }
        Ok(user)
    }

    /// Generate a code for `user`, persist it bound to `binding`, then send it.
    ///
    /// # Errors
    /// Fails without writing anything for unimplemented modes or a broken
    /// random source; store and dispatch failures are returned as-is.
    pub async fn issue_code(
        &self,
        user: &User,
        binding: &SessionId,
        mode: DeliveryMode,
        length: usize,
    ) -> Result<(), AuthError> {
        if !mode.is_implemented() {
            error!(%mode, "OTP delivery mode is not implemented");
            return Err(AuthError::DeliveryNotImplemented(mode));
        }

        let code = otp::generate_code(length)?;

        self.credentials.ensure_live().await.map_err(AuthError::Store)?;
        let requested_at = self.clock.now_unix();
        let request = NewOtpRequest {
            user_id: user.id,
            code: &code,
            delivery_method: mode,
            session_binding: binding,
            requested_at,
            valid_till: requested_at.saturating_add(self.config.otp_validity_seconds()),
        };
        let request_id = self
            .credentials
            .insert_otp_request(&request)
            .await
            .map_err(AuthError::Store)?;
        debug!(request_id, user_id = user.id, "OTP request stored");

        self.notifier
            .send(mode, &user.email, &code)
            .await
            .map_err(AuthError::Dispatch)?;
        debug!(request_id, %mode, "OTP dispatched");

        Ok(())
    }

    /// Check a submitted code; an empty one asks for a new code instead.
    ///
    /// # Errors
    /// Returns [`AuthError`] for store, session or dispatch failures.
    pub async fn verify_code(
        &self,
        user: &User,
        code: &str,
        session: &mut Session,
        code_length: usize,
        origin: Option<&str>,
    ) -> Result<LoginOutcome, AuthError> {
        if code.is_empty() {
            self.issue_code(user, session.id(), self.config.otp_mode(), code_length)
                .await?;
            return Ok(LoginOutcome::CodeIssued {
                email: user.email.clone(),
            });
        }

        if code.chars().count() < code_length {
            debug!("submitted code is shorter than the configured length");
            return Ok(LoginOutcome::Rejected {
                email: Some(user.email.clone()),
                reason: Rejection::IllegalCredentials,
            });
        }

        self.credentials.ensure_live().await.map_err(AuthError::Store)?;
        let now = self.clock.now_unix();
        let Some(request) = self
            .credentials
            .find_valid_otp(&user.email, code, session.id(), now)
            .await
            .map_err(AuthError::Store)?
        else {
            debug!("submitted code did not match a live OTP request");
            return Ok(LoginOutcome::Rejected {
                email: Some(user.email.clone()),
                reason: Rejection::InvalidCredentials,
            });
        };

        if let Err(err) = self.credentials.record_login(request.user_id, origin).await {
            warn!("failed to record login for user {}: {err:#}", request.user_id);
        }

        let mut promoted = session.clone();
        promoted.promote(request.user_id, request.user_type_id);
        self.sessions
            .save(&promoted)
            .await
            .map_err(AuthError::Session)?;
        *session = promoted;

        debug!(
            user_id = request.user_id,
            user_type_id = request.user_type_id,
            "session authenticated"
        );
        Ok(LoginOutcome::Authenticated {
            user_id: request.user_id,
            user_type_id: request.user_type_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ManualClock;
    use crate::notify::RecordingNotifier;
    use crate::store::{MemoryCredentialStore, MemorySessionStore};
    use anyhow::Result;

    const START: i64 = 1_700_000_000;

    struct Fixture {
        credentials: Arc<MemoryCredentialStore>,
        sessions: Arc<MemorySessionStore>,
        notifier: Arc<RecordingNotifier>,
        clock: Arc<ManualClock>,
        authenticator: Authenticator,
    }

    fn customer() -> User {
        User {
            id: 3,
            email: "a@example.com".to_string(),
            mobile_number: None,
            user_type_id: 4,
            is_active: true,
        }
    }

    fn fixture(config: AuthConfig) -> Fixture {
        let credentials = Arc::new(MemoryCredentialStore::new().with_user(customer()));
        let sessions = Arc::new(MemorySessionStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let clock = Arc::new(ManualClock::new(START));
        let authenticator = Authenticator::new(
            credentials.clone(),
            sessions.clone(),
            notifier.clone(),
            config,
        )
        .with_clock(clock.clone());
        Fixture {
            credentials,
            sessions,
            notifier,
            clock,
            authenticator,
        }
    }

    fn new_session() -> Result<Session> {
        Ok(Session::new(SessionId::generate()?))
    }

    #[tokio::test]
    async fn unknown_email_is_invalid_email() -> Result<()> {
        let fx = fixture(AuthConfig::new());
        let mut session = new_session()?;
        for code in ["", "short", "ABCDEF"] {
            let outcome = fx
                .authenticator
                .handle_login_submission("nobody@example.com", code, &mut session, None)
                .await?;
            assert_eq!(
                outcome,
                LoginOutcome::Rejected {
                    email: None,
                    reason: Rejection::InvalidEmail
                }
            );
        }
        assert!(fx.credentials.otp_requests().is_empty());
        assert!(fx.notifier.sent().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn empty_code_issues_bound_code() -> Result<()> {
        let fx = fixture(AuthConfig::new().with_otp_length(8));
        let mut session = new_session()?;
        let outcome = fx
            .authenticator
            .handle_login_submission("a@example.com", "", &mut session, None)
            .await?;
        assert_eq!(
            outcome,
            LoginOutcome::CodeIssued {
                email: "a@example.com".to_string()
            }
        );

        let requests = fx.credentials.otp_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].code.len(), 8);
        assert_eq!(requests[0].session_binding, session.id().as_str());
        assert_eq!(requests[0].requested_at, START);
        assert_eq!(requests[0].valid_till, START + 33);
        assert_eq!(requests[0].delivery_method, "email");
        assert_eq!(fx.notifier.last_code(), Some(requests[0].code.clone()));
        assert!(!session.claims().is_complete());
        Ok(())
    }

    #[tokio::test]
    async fn correct_code_promotes_and_saves_session() -> Result<()> {
        let fx = fixture(AuthConfig::new());
        let mut session = new_session()?;
        fx.authenticator
            .handle_login_submission("a@example.com", "", &mut session, None)
            .await?;
        let code = fx.notifier.last_code().unwrap_or_default();

        fx.clock.advance(10);
        let outcome = fx
            .authenticator
            .handle_login_submission("a@example.com", &code, &mut session, Some("10.0.0.7"))
            .await?;
        assert_eq!(
            outcome,
            LoginOutcome::Authenticated {
                user_id: 3,
                user_type_id: 4
            }
        );
        assert!(session.claims().is_complete());
        let stored = fx.sessions.stored(session.id()).unwrap_or_default();
        assert_eq!(stored.get("user_id"), Some(&serde_json::json!(3)));
        assert_eq!(stored.get("is_logged_in"), Some(&serde_json::json!(true)));
        assert_eq!(fx.credentials.logins(), vec![(3, Some("10.0.0.7".to_string()))]);
        Ok(())
    }

    #[tokio::test]
    async fn validity_boundary_is_exclusive() -> Result<()> {
        let fx = fixture(AuthConfig::new());
        let mut session = new_session()?;
        fx.authenticator
            .handle_login_submission("a@example.com", "", &mut session, None)
            .await?;
        let code = fx.notifier.last_code().unwrap_or_default();

        fx.clock.set(START + 32);
        let still_valid = fx
            .credentials
            .find_valid_otp("a@example.com", &code, session.id(), fx.clock.now_unix())
            .await?;
        assert!(still_valid.is_some());

        fx.clock.set(START + 33);
        let outcome = fx
            .authenticator
            .handle_login_submission("a@example.com", &code, &mut session, None)
            .await?;
        assert_eq!(
            outcome,
            LoginOutcome::Rejected {
                email: Some("a@example.com".to_string()),
                reason: Rejection::InvalidCredentials
            }
        );
        assert!(!session.claims().is_complete());
        Ok(())
    }

    #[tokio::test]
    async fn code_from_another_session_is_rejected() -> Result<()> {
        let fx = fixture(AuthConfig::new());
        let mut issuing = new_session()?;
        fx.authenticator
            .handle_login_submission("a@example.com", "", &mut issuing, None)
            .await?;
        let code = fx.notifier.last_code().unwrap_or_default();

        let mut other = new_session()?;
        let outcome = fx
            .authenticator
            .handle_login_submission("a@example.com", &code, &mut other, None)
            .await?;
        assert_eq!(
            outcome,
            LoginOutcome::Rejected {
                email: Some("a@example.com".to_string()),
                reason: Rejection::InvalidCredentials
            }
        );
        assert_eq!(fx.sessions.saves(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn short_code_skips_otp_lookup() -> Result<()> {
        let fx = fixture(AuthConfig::new());
        let mut session = new_session()?;
        let outcome = fx
            .authenticator
            .handle_login_submission("a@example.com", "abc", &mut session, None)
            .await?;
        assert_eq!(
            outcome,
            LoginOutcome::Rejected {
                email: Some("a@example.com".to_string()),
                reason: Rejection::IllegalCredentials
            }
        );
        assert_eq!(fx.credentials.calls(), vec!["find_user_by_email"]);
        Ok(())
    }

    #[tokio::test]
    async fn long_code_falls_through_to_lookup() -> Result<()> {
        let fx = fixture(AuthConfig::new());
        let mut session = new_session()?;
        let outcome = fx
            .authenticator
            .handle_login_submission("a@example.com", "abcdefghijkl", &mut session, None)
            .await?;
        assert_eq!(
            outcome,
            LoginOutcome::Rejected {
                email: Some("a@example.com".to_string()),
                reason: Rejection::InvalidCredentials
            }
        );
        assert!(fx.credentials.calls().contains(&"find_valid_otp"));
        Ok(())
    }

    #[tokio::test]
    async fn unimplemented_mode_fails_without_writing() -> Result<()> {
        let fx = fixture(AuthConfig::new().with_otp_mode(DeliveryMode::Sms));
        let mut session = new_session()?;
        let result = fx
            .authenticator
            .handle_login_submission("a@example.com", "", &mut session, None)
            .await;
        assert!(matches!(
            result,
            Err(AuthError::DeliveryNotImplemented(DeliveryMode::Sms))
        ));
        assert!(fx.credentials.otp_requests().is_empty());
        assert!(fx.notifier.sent().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn dispatch_failure_is_infrastructure_error() -> Result<()> {
        let fx = fixture(AuthConfig::new());
        fx.notifier.set_failing(true);
        let mut session = new_session()?;
        let result = fx
            .authenticator
            .handle_login_submission("a@example.com", "", &mut session, None)
            .await;
        assert!(matches!(result, Err(AuthError::Dispatch(_))));
        // persisted before dispatch was attempted
        assert_eq!(fx.credentials.otp_requests().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn store_outage_is_infrastructure_error() -> Result<()> {
        let fx = fixture(AuthConfig::new());
        fx.credentials.set_unavailable(true);
        let mut session = new_session()?;
        let result = fx
            .authenticator
            .handle_login_submission("a@example.com", "ABCDEF", &mut session, None)
            .await;
        assert!(matches!(result, Err(AuthError::Store(_))));
        Ok(())
    }

    #[tokio::test]
    async fn session_save_failure_leaves_session_untouched() -> Result<()> {
        let fx = fixture(AuthConfig::new());
        let mut session = new_session()?;
        fx.authenticator
            .handle_login_submission("a@example.com", "", &mut session, None)
            .await?;
        let code = fx.notifier.last_code().unwrap_or_default();

        fx.sessions.set_fail_saves(true);
        let result = fx
            .authenticator
            .handle_login_submission("a@example.com", &code, &mut session, None)
            .await;
        assert!(matches!(result, Err(AuthError::Session(_))));
        assert!(!session.claims().is_complete());
        Ok(())
    }

    #[tokio::test]
    async fn every_store_touching_step_checks_liveness() -> Result<()> {
        let fx = fixture(AuthConfig::new());
        let mut session = new_session()?;
        fx.authenticator
            .handle_login_submission("a@example.com", "", &mut session, None)
            .await?;
        // identity lookup + issuance
        assert_eq!(fx.credentials.pings(), 2);
        Ok(())
    }
}
