//! Session-backed OTP authentication and role gating.
//!
//! Flow Overview:
//! - `Authenticator` drives the login challenge: identity lookup, OTP issuance
//!   bound to the caller's session, OTP verification, session promotion.
//! - `Guard` answers "authenticated?" and "authenticated and privileged?" for a
//!   session, always re-checking the `(user, role)` pair against the credential
//!   store.
//!
//! Neither holds state of its own; both coordinate the credential store, the
//! session store and the notifier handed to them at construction.

mod authenticator;
mod clock;
mod config;
mod error;
mod guard;
pub mod otp;
pub mod session;

pub use authenticator::{Authenticator, LoginOutcome, Rejection};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    resolve_otp_length, AuthConfig, DEFAULT_ADMIN_USER_TYPE_ID, DEFAULT_OTP_LENGTH,
    DEFAULT_OTP_VALIDITY_SECONDS, DEFAULT_SESSION_NAME, MAX_OTP_LENGTH,
};
pub use error::AuthError;
pub use guard::{Guard, Standing};
pub use session::{Claim, Session, SessionClaims, SessionId, Trust};
