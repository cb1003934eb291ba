//! In-memory stores for tests and database-less local runs.
//!
//! [`MemoryCredentialStore`] records every query it answers so callers can
//! assert that a decision was reached without touching the store.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{CredentialStore, NewOtpRequest, OtpRequest, SessionStore, User, UserType};
use crate::auth::{Session, SessionId};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| anyhow!("memory store lock poisoned"))
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    users: Mutex<Vec<User>>,
    user_types: Mutex<Vec<UserType>>,
    otp_requests: Mutex<Vec<OtpRequest>>,
    logins: Mutex<Vec<(i64, Option<String>)>>,
    calls: Mutex<Vec<&'static str>>,
    pings: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_user(self, user: User) -> Self {
        if let Ok(mut users) = self.users.lock() {
            users.push(user);
        }
        self
    }

    #[must_use]
    pub fn with_user_type(self, user_type: UserType) -> Self {
        if let Ok(mut user_types) = self.user_types.lock() {
            user_types.push(user_type);
        }
        self
    }

    /// Make every call fail as if the database went away.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Names of the queries answered so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn otp_requests(&self) -> Vec<OtpRequest> {
        self.otp_requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn logins(&self) -> Vec<(i64, Option<String>)> {
        self.logins
            .lock()
            .map(|logins| logins.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: &'static str) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("credential store unavailable");
        }
        lock(&self.calls)?.push(call);
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn ensure_live(&self) -> Result<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("credential store unavailable");
        }
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.record("find_user_by_email")?;
        Ok(lock(&self.users)?
            .iter()
            .find(|user| user.email == email && user.is_active)
            .cloned())
    }

    async fn find_user_by_id_and_role(
        &self,
        user_id: i64,
        user_type_id: i32,
    ) -> Result<Option<User>> {
        self.record("find_user_by_id_and_role")?;
        Ok(lock(&self.users)?
            .iter()
            .find(|user| user.id == user_id && user.user_type_id == user_type_id)
            .cloned())
    }

    async fn find_user_type(&self, user_type_id: i32) -> Result<Option<UserType>> {
        self.record("find_user_type")?;
        Ok(lock(&self.user_types)?
            .iter()
            .find(|user_type| user_type.id == user_type_id)
            .cloned())
    }

    async fn insert_otp_request(&self, request: &NewOtpRequest<'_>) -> Result<i64> {
        self.record("insert_otp_request")?;
        let (email, user_type_id) = lock(&self.users)?
            .iter()
            .find(|user| user.id == request.user_id)
            .map(|user| (user.email.clone(), user.user_type_id))
            .ok_or_else(|| anyhow!("unknown user {}", request.user_id))?;

        let mut requests = lock(&self.otp_requests)?;
        let duplicate = requests.iter().any(|existing| {
            existing.user_id == request.user_id
                && existing.code == request.code
                && existing.session_binding == request.session_binding.as_str()
        });
        if duplicate {
            bail!("duplicate OTP request for user {}", request.user_id);
        }

        let id = i64::try_from(requests.len())?.saturating_add(1);
        requests.push(OtpRequest {
            id,
            user_id: request.user_id,
            code: request.code.to_string(),
            delivery_method: request.delivery_method.as_str().to_string(),
            requested_at: request.requested_at,
            valid_till: request.valid_till,
            session_binding: request.session_binding.as_str().to_string(),
            user_email: email,
            user_type_id,
        });
        Ok(id)
    }

    async fn find_valid_otp(
        &self,
        email: &str,
        code: &str,
        session_binding: &SessionId,
        now: i64,
    ) -> Result<Option<OtpRequest>> {
        self.record("find_valid_otp")?;
        Ok(lock(&self.otp_requests)?
            .iter()
            .rev()
            .find(|request| {
                request.user_email == email
                    && request.code == code
                    && request.session_binding == session_binding.as_str()
                    && now < request.valid_till
            })
            .cloned())
    }

    async fn record_login(&self, user_id: i64, origin: Option<&str>) -> Result<()> {
        self.record("record_login")?;
        lock(&self.logins)?.push((user_id, origin.map(str::to_string)));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Map<String, Value>>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Stored data for a session id, as last saved.
    #[must_use]
    pub fn stored(&self, id: &SessionId) -> Option<Map<String, Value>> {
        self.sessions
            .lock()
            .ok()
            .and_then(|sessions| sessions.get(id.as_str()).cloned())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<Session>> {
        Ok(lock(&self.sessions)?
            .get(id.as_str())
            .map(|values| Session::from_parts(id.clone(), values.clone())))
    }

    async fn save(&self, session: &Session) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            bail!("session store unavailable");
        }
        lock(&self.sessions)?.insert(session.id().as_str().to_string(), session.values().clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
