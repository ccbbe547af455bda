use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;
use crate::error::AppError;
use crate::mail::templates::EmailMessage;

/// Outgoing mail.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), AppError>;
}

/// Pick SMTP when a host is configured, log-only otherwise.
pub fn from_config(config: &SmtpConfig) -> Result<Box<dyn Mailer>, AppError> {
    match &config.host {
        Some(host) => {
            tracing::info!("Sending mail through SMTP relay {host}:{}", config.port);
            Ok(Box::new(SmtpMailer::new(config, host)?))
        }
        None => {
            tracing::warn!("No SMTP host configured; emails will only be logged");
            Ok(Box::new(LogMailer))
        }
    }
}

/// SMTP implementation of Mailer (STARTTLS relay).
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig, host: &str) -> Result<Self, AppError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| AppError::Mail(format!("Invalid SMTP relay '{host}': {e}")))?
            .port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), AppError> {
        let email = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| AppError::Mail(format!("Invalid sender address: {e}")))?,
            )
            .to(message
                .to
                .parse()
                .map_err(|e| AppError::Mail(format!("Invalid recipient '{}': {e}", message.to)))?)
            .subject(message.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(message.body)
            .map_err(|e| AppError::Mail(format!("Failed to build email: {e}")))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| AppError::Mail(format!("SMTP delivery failed: {e}")))?;

        Ok(())
    }
}

/// Mailer that only writes messages to the log. Used when SMTP is not configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), AppError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            "Email (not sent, SMTP disabled):\n{}",
            message.body
        );
        Ok(())
    }
}
