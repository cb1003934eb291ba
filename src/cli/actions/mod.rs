use crate::auth::AuthConfig;

pub mod server;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        auth: AuthConfig,
        smtp: Option<SmtpArgs>,
    },
}

/// SMTP relay settings; the password travels in [`super::globals::GlobalArgs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpArgs {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub from: String,
}
