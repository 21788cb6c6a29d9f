use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor, message::header::ContentType,
};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let transport = if config.smtp_username.is_empty() {
            // Local relay (Mailpit and friends), no TLS or credentials.
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
                .port(config.smtp_port)
                .build()
        } else {
            let creds = Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            );
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
                .credentials(creds)
                .build()
        };
        Ok(Self {
            transport,
            from: config.smtp_from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        let email = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| AppError::Unprocessable(format!("bad from address: {e:?}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| AppError::BadRequest(format!("bad recipient address: {e:?}")))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| AppError::Unprocessable(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| AppError::Unprocessable(e.to_string()))?;
        Ok(())
    }
}

/// Drops mail on the floor. Used by tests and by deployments without SMTP.
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> AppResult<()> {
        tracing::debug!(to, subject, "mailer disabled, dropping message");
        Ok(())
    }
}
