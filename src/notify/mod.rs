//! OTP delivery.
//!
//! Only email delivery exists today. `sms`, `both` (email and sms) and
//! `combined` (first half of the code by email, second half by sms) are
//! recognised modes that fail with an explicit error instead of silently
//! delivering nothing.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use thiserror::Error;

mod email;

pub use email::{EmailMessage, EmailSender, LogEmailSender, SmtpConfig, SmtpEmailSender};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryMode {
    Email,
    Sms,
    Both,
    Combined,
}

impl DeliveryMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Both => "both",
            Self::Combined => "combined",
        }
    }

    #[must_use]
    pub fn is_implemented(self) -> bool {
        matches!(self, Self::Email)
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown OTP mode {0}")]
pub struct UnknownDeliveryMode(pub String);

impl FromStr for DeliveryMode {
    type Err = UnknownDeliveryMode;

    /// Names match exactly; an empty mode means email.
    fn from_str(mode: &str) -> Result<Self, Self::Err> {
        match mode {
            "" | "email" => Ok(Self::Email),
            "sms" => Ok(Self::Sms),
            "both" => Ok(Self::Both),
            "combined" => Ok(Self::Combined),
            _ => Err(UnknownDeliveryMode(mode.to_string())),
        }
    }
}

/// Sends an issued code to its owner.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, mode: DeliveryMode, recipient: &str, code: &str) -> Result<()>;
}

/// Delivers codes by email through an [`EmailSender`].
pub struct EmailNotifier {
    sender: Arc<dyn EmailSender>,
    app_name: String,
}

impl EmailNotifier {
    #[must_use]
    pub fn new(sender: Arc<dyn EmailSender>, app_name: String) -> Self {
        Self { sender, app_name }
    }

    fn message(&self, recipient: &str, code: &str) -> EmailMessage {
        EmailMessage {
            to_email: recipient.to_string(),
            subject: format!("LOGIN OTP for {}", self.app_name),
            html_body: format!(
                "<p>Your OTP to login to {} is <b>{code}</b></p>",
                self.app_name
            ),
        }
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, mode: DeliveryMode, recipient: &str, code: &str) -> Result<()> {
        match mode {
            DeliveryMode::Email => self.sender.send(&self.message(recipient, code)).await,
            DeliveryMode::Sms | DeliveryMode::Both | DeliveryMode::Combined => {
                bail!("OTP delivery over {mode} is not implemented")
            }
        }
    }
}

/// A code handed to [`RecordingNotifier`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentCode {
    pub mode: DeliveryMode,
    pub recipient: String,
    pub code: String,
}

/// Notifier that keeps what it was asked to send; for tests and local runs.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentCode>>,
    failing: Mutex<bool>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut flag) = self.failing.lock() {
            *flag = failing;
        }
    }

    #[must_use]
    pub fn sent(&self) -> Vec<SentCode> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn last_code(&self) -> Option<String> {
        self.sent().last().map(|sent| sent.code.clone())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, mode: DeliveryMode, recipient: &str, code: &str) -> Result<()> {
        if self.failing.lock().map(|flag| *flag).unwrap_or(false) {
            bail!("dispatch unavailable");
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentCode {
                mode,
                recipient: recipient.to_string(),
                code: code.to_string(),
            });
        }
        Ok(())
    }
}
