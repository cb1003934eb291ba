use crate::{
    bitebuddy::{self, AppState},
    cli::{actions::Action, globals::GlobalArgs},
    notify::{EmailNotifier, EmailSender, LogEmailSender, SmtpConfig, SmtpEmailSender},
    store::{LiveDatabase, PgCredentialStore, PgSessionStore},
    APP_NAME,
};
use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// Handle the server action
///
/// # Errors
/// Returns an error if the DSN is invalid, the database is unreachable or the
/// server fails
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<()> {
    match action {
        Action::Server { port, auth, smtp } => {
            let dsn = Url::parse(globals.dsn.expose_secret()).context("invalid DSN")?;
            info!(
                "Connecting to database {}:{}{}",
                dsn.host_str().unwrap_or("localhost"),
                dsn.port().unwrap_or(5432),
                dsn.path()
            );

            let db = Arc::new(LiveDatabase::connect(globals.dsn.clone()).await?);
            let credentials = Arc::new(PgCredentialStore::new(db.clone()));
            let sessions = Arc::new(PgSessionStore::new(db, auth.session_ttl_seconds()));

            let sender: Arc<dyn EmailSender> = if let Some(smtp) = smtp {
                Arc::new(SmtpEmailSender::new(&SmtpConfig {
                    host: smtp.host,
                    port: smtp.port,
                    username: smtp.username,
                    password: globals.smtp_password.clone(),
                    from_name: APP_NAME.to_string(),
                    from_email: smtp.from,
                })?)
            } else {
                warn!("No SMTP host configured, OTP emails will only be logged");
                Arc::new(LogEmailSender)
            };
            let notifier = Arc::new(EmailNotifier::new(sender, APP_NAME.to_string()));

            info!(
                otp_length = auth.otp_length(),
                otp_validity = auth.otp_validity_seconds(),
                otp_mode = %auth.otp_mode(),
                admin_user_type_id = auth.admin_user_type_id(),
                "Login configured"
            );

            if !auth.otp_mode().is_implemented() {
                warn!(
                    "OTP mode {} has no delivery backend, every code request will fail",
                    auth.otp_mode()
                );
            }

            let state = Arc::new(AppState::new(credentials, sessions, notifier, auth));

            bitebuddy::new(port, state).await?;
        }
    }

    Ok(())
}
