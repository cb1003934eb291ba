//! Login and session configuration.

use crate::notify::DeliveryMode;

/// Code length used when the configured one is missing or not positive.
pub const DEFAULT_OTP_LENGTH: usize = 6;
/// Longest code the `otp_requests.otp_code` column holds.
pub const MAX_OTP_LENGTH: usize = 24;
/// Seconds an issued code stays verifiable.
pub const DEFAULT_OTP_VALIDITY_SECONDS: i64 = 33;
pub const DEFAULT_ADMIN_USER_TYPE_ID: i32 = 1;
pub const DEFAULT_SESSION_NAME: &str = "bitebuddy_session";
const DEFAULT_SESSION_TTL_SECONDS: i64 = 12 * 60 * 60;

/// Resolve the configured OTP length, substituting the default for `<= 0`
/// and capping it at [`MAX_OTP_LENGTH`].
#[must_use]
pub fn resolve_otp_length(configured: i64) -> usize {
    if configured <= 0 {
        return DEFAULT_OTP_LENGTH;
    }
    usize::try_from(configured).map_or(MAX_OTP_LENGTH, |length| length.min(MAX_OTP_LENGTH))
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    otp_length: i64,
    otp_validity_seconds: i64,
    otp_mode: DeliveryMode,
    admin_user_type_id: i32,
    session_name: String,
    session_ttl_seconds: i64,
    cookie_secure: bool,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            otp_length: 0,
            otp_validity_seconds: DEFAULT_OTP_VALIDITY_SECONDS,
            otp_mode: DeliveryMode::Email,
            admin_user_type_id: DEFAULT_ADMIN_USER_TYPE_ID,
            session_name: DEFAULT_SESSION_NAME.to_string(),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            cookie_secure: false,
        }
    }

    #[must_use]
    pub fn with_otp_length(mut self, length: i64) -> Self {
        self.otp_length = length;
        self
    }

    #[must_use]
    pub fn with_otp_validity_seconds(mut self, seconds: i64) -> Self {
        self.otp_validity_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_mode(mut self, mode: DeliveryMode) -> Self {
        self.otp_mode = mode;
        self
    }

    #[must_use]
    pub fn with_admin_user_type_id(mut self, user_type_id: i32) -> Self {
        self.admin_user_type_id = user_type_id;
        self
    }

    #[must_use]
    pub fn with_session_name(mut self, name: String) -> Self {
        self.session_name = name;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    /// Effective OTP length; resolved on every call so a login attempt reads it once.
    #[must_use]
    pub fn otp_length(&self) -> usize {
        resolve_otp_length(self.otp_length)
    }

    #[must_use]
    pub fn otp_validity_seconds(&self) -> i64 {
        self.otp_validity_seconds
    }

    #[must_use]
    pub fn otp_mode(&self) -> DeliveryMode {
        self.otp_mode
    }

    #[must_use]
    pub fn admin_user_type_id(&self) -> i32 {
        self.admin_user_type_id
    }

    #[must_use]
    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_otp_length_substitutes_default() {
        assert_eq!(resolve_otp_length(0), DEFAULT_OTP_LENGTH);
        assert_eq!(resolve_otp_length(-4), DEFAULT_OTP_LENGTH);
        assert_eq!(resolve_otp_length(8), 8);
    }

    #[test]
    fn resolve_otp_length_is_capped() {
        assert_eq!(resolve_otp_length(24), MAX_OTP_LENGTH);
        assert_eq!(resolve_otp_length(25), MAX_OTP_LENGTH);
        assert_eq!(resolve_otp_length(i64::MAX), MAX_OTP_LENGTH);
        assert_eq!(
            AuthConfig::new().with_otp_length(i64::MAX).otp_length(),
            MAX_OTP_LENGTH
        );
    }

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new();
        assert_eq!(config.otp_length(), DEFAULT_OTP_LENGTH);
        assert_eq!(config.otp_validity_seconds(), DEFAULT_OTP_VALIDITY_SECONDS);
        assert_eq!(config.otp_mode(), DeliveryMode::Email);
        assert_eq!(config.admin_user_type_id(), DEFAULT_ADMIN_USER_TYPE_ID);
        assert_eq!(config.session_name(), DEFAULT_SESSION_NAME);
        assert_eq!(config.session_ttl_seconds(), DEFAULT_SESSION_TTL_SECONDS);
        assert!(!config.cookie_secure());

        let config = config
            .with_otp_length(10)
            .with_otp_validity_seconds(120)
            .with_otp_mode(DeliveryMode::Sms)
            .with_admin_user_type_id(2)
            .with_session_name("bb".to_string())
            .with_session_ttl_seconds(60)
            .with_cookie_secure(true);

        assert_eq!(config.otp_length(), 10);
        assert_eq!(config.otp_validity_seconds(), 120);
        assert_eq!(config.otp_mode(), DeliveryMode::Sms);
        assert_eq!(config.admin_user_type_id(), 2);
        assert_eq!(config.session_name(), "bb");
        assert_eq!(config.session_ttl_seconds(), 60);
        assert!(config.cookie_secure());
    }
}
