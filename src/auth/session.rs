//! Typed session value object and the trust decision derived from it.
//!
//! Session data is a loose JSON object on disk; the three auth claims are read
//! out of it as tri-state values so a wrong type is never confused with an
//! absent key. [`SessionClaims::trust`] is pure: it only says whether the claims
//! are worth checking against the credential store.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::OnceLock;

pub const USER_ID_KEY: &str = "user_id";
pub const USER_TYPE_ID_KEY: &str = "user_type_id";
pub const LOGGED_IN_KEY: &str = "is_logged_in";

const SESSION_ID_BYTES: usize = 32;

static SESSION_ID_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn session_id_pattern() -> Option<&'static Regex> {
    SESSION_ID_PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{43}$").ok())
        .as_ref()
}

/// Opaque session identifier carried in the session cookie.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Create a new random identifier (256 bits, URL-safe base64).
    ///
    /// # Errors
    /// Returns an error if the OS random source fails.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .context("failed to generate session id")?;
        Ok(Self(Base64UrlUnpadded::encode_string(&bytes)))
    }

    /// Accept a client-supplied identifier only if it has the generated shape.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = session_id_pattern().is_some_and(|re| re.is_match(raw));
        valid.then(|| Self(raw.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A claim read from session data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Claim<T> {
    Valid(T),
    /// Key present with a value of the wrong type.
    Invalid,
    Absent,
}

impl<T: Copy> Claim<T> {
    #[must_use]
    pub fn value(&self) -> Option<T> {
        match self {
            Self::Valid(value) => Some(*value),
            Self::Invalid | Self::Absent => None,
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

fn read_claim<T>(
    values: &Map<String, Value>,
    key: &str,
    read: impl Fn(&Value) -> Option<T>,
) -> Claim<T> {
    match values.get(key) {
        None => Claim::Absent,
        Some(value) => read(value).map_or(Claim::Invalid, Claim::Valid),
    }
}

/// The three auth claims of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionClaims {
    pub user_id: Claim<i64>,
    pub user_type_id: Claim<i32>,
    pub logged_in: Claim<bool>,
}

/// What the guard should do with a set of claims.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trust {
    /// Claims look authenticated; confirm `(user_id, user_type_id)` in the store.
    Verify { user_id: i64, user_type_id: i32 },
    Deny,
}

impl SessionClaims {
    #[must_use]
    pub fn from_values(values: &Map<String, Value>) -> Self {
        Self {
            user_id: read_claim(values, USER_ID_KEY, Value::as_i64),
            user_type_id: read_claim(values, USER_TYPE_ID_KEY, |value| {
                value.as_i64().and_then(|id| i32::try_from(id).ok())
            }),
            logged_in: read_claim(values, LOGGED_IN_KEY, Value::as_bool),
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.user_id.is_valid() && self.user_type_id.is_valid() && self.logged_in.is_valid()
    }

    /// Decide whether these claims deserve a credential-store check.
    ///
    /// With `required_user_type` set, a role mismatch denies before any lookup.
    #[must_use]
    pub fn trust(&self, required_user_type: Option<i32>) -> Trust {
        let (Some(user_id), Some(user_type_id), Some(true)) = (
            self.user_id.value(),
            self.user_type_id.value(),
            self.logged_in.value(),
        ) else {
            return Trust::Deny;
        };

        match required_user_type {
            Some(required) if required != user_type_id => Trust::Deny,
            _ => Trust::Verify {
                user_id,
                user_type_id,
            },
        }
    }
}

/// Server-side session state addressed by [`SessionId`].
#[derive(Clone, Debug)]
pub struct Session {
    id: SessionId,
    values: Map<String, Value>,
    fresh: bool,
}

impl Session {
    /// A session created on this request; its cookie still has to be sent.
    #[must_use]
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            values: Map::new(),
            fresh: true,
        }
    }

    /// A session loaded from the store.
    #[must_use]
    pub fn from_parts(id: SessionId, values: Map<String, Value>) -> Self {
        Self {
            id,
            values,
            fresh: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    #[must_use]
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    #[must_use]
    pub fn claims(&self) -> SessionClaims {
        SessionClaims::from_values(&self.values)
    }

    /// Mark the session as logged in for the given user and role.
    pub fn promote(&mut self, user_id: i64, user_type_id: i32) {
        self.insert(USER_ID_KEY, Value::from(user_id));
        self.insert(USER_TYPE_ID_KEY, Value::from(user_type_id));
        self.insert(LOGGED_IN_KEY, Value::Bool(true));
    }

    pub fn clear_claims(&mut self) {
        self.values.remove(USER_ID_KEY);
        self.values.remove(USER_TYPE_ID_KEY);
        self.values.remove(LOGGED_IN_KEY);
    }

    /// Overwrite absent or mistyped claims with unauthenticated defaults.
    ///
    /// Returns `true` when anything changed and the session needs saving.
    pub fn normalize(&mut self) -> bool {
        let claims = self.claims();
        let mut changed = false;
        if !claims.user_id.is_valid() {
            self.insert(USER_ID_KEY, Value::from(0_i64));
            changed = true;
        }
        if !claims.user_type_id.is_valid() {
            self.insert(USER_TYPE_ID_KEY, Value::from(0_i32));
            changed = true;
        }
        if !claims.logged_in.is_valid() {
            self.insert(LOGGED_IN_KEY, Value::Bool(false));
            changed = true;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session_with(values: Value) -> Result<Session> {
        let Value::Object(map) = values else {
            anyhow::bail!("expected object");
        };
        Ok(Session::from_parts(SessionId::generate()?, map))
    }

    #[test]
    fn generated_ids_parse_back() -> Result<()> {
        let id = SessionId::generate()?;
        assert_eq!(id.as_str().len(), 43);
        assert_eq!(SessionId::parse(id.as_str()), Some(id));
        Ok(())
    }

    #[test]
    fn malformed_ids_are_refused() {
        assert!(SessionId::parse("").is_none());
        assert!(SessionId::parse("short").is_none());
        assert!(SessionId::parse(&"a".repeat(44)).is_none());
        assert!(SessionId::parse(&format!("{}!", "a".repeat(42))).is_none());
    }

    #[test]
    fn id_pattern_is_compiled_once() {
        let first = session_id_pattern();
        let second = session_id_pattern();
        assert!(first.is_some());
        assert!(matches!((first, second), (Some(a), Some(b)) if std::ptr::eq(a, b)));
    }

    #[test]
    fn claims_are_tri_state() -> Result<()> {
        let session = session_with(json!({
            "user_id": 3,
            "user_type_id": "admin",
        }))?;
        let claims = session.claims();
        assert_eq!(claims.user_id, Claim::Valid(3));
        assert_eq!(claims.user_type_id, Claim::Invalid);
        assert_eq!(claims.logged_in, Claim::Absent);
        assert!(!claims.is_complete());
        Ok(())
    }

    #[test]
    fn out_of_range_role_is_invalid() -> Result<()> {
        let session = session_with(json!({ "user_type_id": i64::MAX }))?;
        assert_eq!(session.claims().user_type_id, Claim::Invalid);
        Ok(())
    }

    #[test]
    fn trust_requires_all_claims_and_logged_in() -> Result<()> {
        let logged_out = session_with(json!({
            "user_id": 3, "user_type_id": 4, "is_logged_in": false,
        }))?;
        assert_eq!(logged_out.claims().trust(None), Trust::Deny);

        let partial = session_with(json!({ "user_id": 3, "is_logged_in": true }))?;
        assert_eq!(partial.claims().trust(None), Trust::Deny);

        let complete = session_with(json!({
            "user_id": 3, "user_type_id": 4, "is_logged_in": true,
        }))?;
        assert_eq!(
            complete.claims().trust(None),
            Trust::Verify {
                user_id: 3,
                user_type_id: 4
            }
        );
        Ok(())
    }

    #[test]
    fn trust_with_required_role_denies_mismatch() -> Result<()> {
        let session = session_with(json!({
            "user_id": 3, "user_type_id": 4, "is_logged_in": true,
        }))?;
        assert_eq!(session.claims().trust(Some(1)), Trust::Deny);
        assert_eq!(
            session.claims().trust(Some(4)),
            Trust::Verify {
                user_id: 3,
                user_type_id: 4
            }
        );
        Ok(())
    }

    #[test]
    fn normalize_fills_only_broken_claims() -> Result<()> {
        let mut session = session_with(json!({ "user_id": 9, "user_type_id": "x" }))?;
        assert!(session.normalize());
        assert_eq!(session.values().get(USER_ID_KEY), Some(&json!(9)));
        assert_eq!(session.values().get(USER_TYPE_ID_KEY), Some(&json!(0)));
        assert_eq!(session.values().get(LOGGED_IN_KEY), Some(&json!(false)));
        assert!(!session.normalize());
        Ok(())
    }

    #[test]
    fn promote_then_clear() -> Result<()> {
        let mut session = Session::new(SessionId::generate()?);
        assert!(session.is_fresh());
        session.insert("theme", json!("dark"));
        session.promote(3, 4);
        assert!(session.claims().is_complete());

        session.clear_claims();
        let claims = session.claims();
        assert_eq!(claims.user_id, Claim::Absent);
        assert_eq!(claims.user_type_id, Claim::Absent);
        assert_eq!(claims.logged_in, Claim::Absent);
        assert_eq!(session.values().get("theme"), Some(&json!("dark")));
        Ok(())
    }
}
