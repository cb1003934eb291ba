use secrecy::SecretString;

/// Secrets read at startup, kept out of [`super::actions::Action`] so they are
/// never printed with it.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub dsn: SecretString,
    pub smtp_password: SecretString,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(dsn: SecretString) -> Self {
        Self {
            dsn,
            smtp_password: SecretString::default(),
        }
    }

    pub fn set_smtp_password(&mut self, password: SecretString) {
        self.smtp_password = password;
    }
}
