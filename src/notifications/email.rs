//! SMTP delivery of verification codes, using the `[email]` section of the config.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use super::{MailError, Mailer, OtpEmail};
use crate::config::EmailConfig;

pub struct SmtpMailer {
    config: EmailConfig,
}

impl SmtpMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or(MailError::NotConfigured)?;

        let builder = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)
                .map_err(|e| MailError::Build(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port);

        let builder = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            builder.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            builder
        };

        Ok(builder.build())
    }

    fn build_message(&self, email: &OtpEmail) -> Result<Message, MailError> {
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or(MailError::NotConfigured)?;

        let from: Mailbox = format!("{} <{}>", self.config.from_name, from_address)
            .parse()
            .map_err(|_| MailError::InvalidAddress(from_address.clone()))?;
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|_| MailError::InvalidAddress(email.to.clone()))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(format!("Your {} verification code", self.config.from_name))
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(render_otp_text(email, &self.config.from_name)),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(render_otp_html(email, &self.config.from_name)),
                    ),
            )
            .map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_otp(&self, email: &OtpEmail) -> Result<(), MailError> {
        let message = self.build_message(email)?;
        self.transport()?
            .send(message)
            .await
            .map_err(|e| MailError::Send(e.to_string()))?;

        tracing::info!(to = %email.to, "Verification email sent");
        Ok(())
    }
}

pub fn render_otp_html(email: &OtpEmail, store_name: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Verify your email</title>
    <style>
        body {{ font-family: Georgia, 'Times New Roman', serif; background-color: #faf7f2; margin: 0; padding: 0; }}
        .container {{ max-width: 520px; margin: 0 auto; padding: 40px 20px; }}
        .card {{ background-color: #ffffff; border-radius: 8px; padding: 32px 24px; border-top: 4px solid #b8860b; }}
        .code {{ font-size: 32px; letter-spacing: 8px; text-align: center; font-weight: bold; color: #111827; margin: 24px 0; }}
        .note {{ color: #6b7280; font-size: 13px; text-align: center; }}
    </style>
</head>
<body>
    <div class="container">
        <div class="card">
            <p>Hi {name},</p>
            <p>Use this code to verify your {store} account:</p>
            <div class="code">{code}</div>
            <p class="note">The code expires in {minutes} minutes. If you did not sign up, you can ignore this email.</p>
        </div>
    </div>
</body>
</html>"#,
        name = html_escape(&email.name),
        store = html_escape(store_name),
        code = html_escape(&email.code),
        minutes = email.expires_in_minutes,
    )
}

pub fn render_otp_text(email: &OtpEmail, store_name: &str) -> String {
    format!(
        "Hi {name},\n\nYour {store} verification code is: {code}\n\n\
         The code expires in {minutes} minutes. If you did not sign up, you can ignore this email.\n",
        name = email.name,
        store = store_name,
        code = email.code,
        minutes = email.expires_in_minutes,
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
