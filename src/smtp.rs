//! SMTP submission via `lettre`
//!
//! Port 465 uses implicit TLS; any other port upgrades with STARTTLS.
//! The transport authenticates with the same account credentials as IMAP.

use std::time::Duration;

use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;

use crate::config::ServerConfig;
use crate::errors::{AppError, AppResult};
use crate::transport::MailSender;

/// Port conventionally used for SMTP over implicit TLS
const SMTPS_PORT: u16 = 465;

/// Authenticated SMTP transport for one send
pub struct SmtpMailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailSender {
    /// Build the transport from server config
    ///
    /// No connection is made until the first send.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the relay host cannot be used for TLS.
    pub fn new(config: &ServerConfig) -> AppResult<Self> {
        let builder = if config.smtp_port == SMTPS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
        }
        .map_err(|e| AppError::Connection(format!("SMTP relay setup failed: {e}")))?;

        let credentials = Credentials::new(
            config.account.clone(),
            config.password.expose_secret().to_owned(),
        );
        let transport = builder
            .port(config.smtp_port)
            .credentials(credentials)
            .timeout(Some(Duration::from_millis(config.socket_timeout_ms)))
            .build();
        Ok(Self { transport })
    }
}

impl MailSender for SmtpMailSender {
    async fn send(&mut self, message: Message) -> AppResult<()> {
        let recipients = message.envelope().to().len();
        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::Connection(format!("SMTP send failed: {e}")))?;
        tracing::info!(recipients, "message submitted over SMTP");
        Ok(())
    }
}
