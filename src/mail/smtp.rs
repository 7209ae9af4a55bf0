//! SMTP relay: outbound delivery via lettre.

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};

use super::MailRelay;
use crate::error::MailError;
use crate::model::Account;

/// SMTP relay configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

impl SmtpConfig {
    /// Build config from environment variables.
    /// Returns `None` if `DRIPMAIL_SMTP_HOST` is not set (relay disabled).
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("DRIPMAIL_SMTP_HOST").ok()?;

        let port: u16 = std::env::var("DRIPMAIL_SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("DRIPMAIL_SMTP_USERNAME").unwrap_or_default();
        let password =
            SecretString::from(std::env::var("DRIPMAIL_SMTP_PASSWORD").unwrap_or_default());

        Some(Self {
            host,
            port,
            username,
            password,
        })
    }
}

/// lettre-backed SMTP relay.
pub struct SmtpRelay {
    config: SmtpConfig,
}

impl SmtpRelay {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn send_blocking(
        config: &SmtpConfig,
        from: &str,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), MailError> {
        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::relay(&config.host)
            .map_err(|e| MailError::SendFailed {
                to: to.to_string(),
                reason: format!("SMTP relay error: {e}"),
            })?
            .port(config.port)
            .credentials(creds)
            .build();

        let email = Message::builder()
            .from(from
                .parse()
                .map_err(|e| MailError::InvalidAddress(format!("{from}: {e}")))?)
            .to(to
                .parse()
                .map_err(|e| MailError::InvalidAddress(format!("{to}: {e}")))?)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| MailError::SendFailed {
                to: to.to_string(),
                reason: format!("Failed to build email: {e}"),
            })?;

        transport.send(&email).map_err(|e| MailError::SendFailed {
            to: to.to_string(),
            reason: format!("SMTP send failed: {e}"),
        })?;

        Ok(())
    }
}

#[async_trait]
impl MailRelay for SmtpRelay {
    async fn send(
        &self,
        account: &Account,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), MailError> {
        let config = self.config.clone();
        let from = match &account.display_name {
            Some(name) => format!("{name} <{}>", account.address),
            None => account.address.clone(),
        };
        let (to, subject, body) = (to.to_string(), subject.to_string(), body.to_string());

        // lettre's SmtpTransport is blocking; keep it off the worker threads.
        let result = tokio::task::spawn_blocking(move || {
            Self::send_blocking(&config, &from, &to, &subject, &body)
        })
        .await
        .map_err(|e| MailError::SendFailed {
            to: "unknown".into(),
            reason: format!("send task panicked: {e}"),
        })?;

        if result.is_ok() {
            tracing::info!(account = %account.address, "Email sent");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_requires_host() {
        // The host variable gates the whole relay.
        unsafe { std::env::remove_var("DRIPMAIL_SMTP_HOST") };
        assert!(SmtpConfig::from_env().is_none());
    }

    #[test]
    fn invalid_to_address_is_rejected() {
        let config = SmtpConfig {
            host: "smtp.example.com".into(),
            port: 587,
            username: "user".into(),
            password: SecretString::from("pass"),
        };
        let err =
            SmtpRelay::send_blocking(&config, "me@example.com", "not-an-address", "s", "b")
                .unwrap_err();
        assert!(matches!(err, MailError::InvalidAddress(_)));
    }
}
