//! Outgoing account email.
//!
//! Handlers talk to a [`Mailer`]; the SMTP implementation lives in [`email`].
//! [`MemoryMailer`] records messages instead of sending them and backs the tests
//! and `--ephemeral` runs.

mod email;

pub use email::{render_otp_html, render_otp_text, SmtpMailer};

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

use crate::config::EmailConfig;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Email delivery is not configured")]
    NotConfigured,

    #[error("Invalid mailbox address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("Failed to send email: {0}")]
    Send(String),
}

/// A one-time verification code addressed to a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpEmail {
    pub to: String,
    pub name: String,
    pub code: String,
    pub expires_in_minutes: i64,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_otp(&self, email: &OtpEmail) -> Result<(), MailError>;
}

/// Build the mailer for a configuration: SMTP when configured, otherwise one
/// that refuses to send.
pub fn from_config(config: &EmailConfig) -> Arc<dyn Mailer> {
    if config.is_configured() {
        Arc::new(SmtpMailer::new(config.clone()))
    } else {
        tracing::warn!("SMTP not configured, verification emails cannot be sent");
        Arc::new(DisabledMailer)
    }
}

pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send_otp(&self, email: &OtpEmail) -> Result<(), MailError> {
        tracing::warn!(to = %email.to, "Email not configured, dropping verification code");
        Err(MailError::NotConfigured)
    }
}

/// Keeps every message in memory
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<OtpEmail>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OtpEmail> {
        self.sent.lock().clone()
    }

    /// Most recent code sent to `to`
    pub fn last_code_for(&self, to: &str) -> Option<String> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|m| m.to.eq_ignore_ascii_case(to))
            .map(|m| m.code.clone())
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send_otp(&self, email: &OtpEmail) -> Result<(), MailError> {
        tracing::info!(to = %email.to, "Captured verification email");
        self.sent.lock().push(email.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn otp(to: &str, code: &str) -> OtpEmail {
        OtpEmail {
            to: to.to_string(),
            name: "Asha".to_string(),
            code: code.to_string(),
            expires_in_minutes: 15,
        }
    }

    #[test]
    fn test_memory_mailer_keeps_latest_code() {
        let mailer = MemoryMailer::new();
        tokio_test::block_on(mailer.send_otp(&otp("a@example.com", "111111"))).unwrap();
        tokio_test::block_on(mailer.send_otp(&otp("A@example.com", "222222"))).unwrap();

        assert_eq!(mailer.sent().len(), 2);
        assert_eq!(mailer.last_code_for("a@example.com").as_deref(), Some("222222"));
        assert!(mailer.last_code_for("b@example.com").is_none());
    }

    #[tokio::test]
    async fn test_disabled_mailer_reports_not_configured() {
        let mailer = from_config(&EmailConfig::default());
        let err = mailer.send_otp(&otp("a@example.com", "123456")).await.unwrap_err();
        assert!(matches!(err, MailError::NotConfigured));
    }
}
