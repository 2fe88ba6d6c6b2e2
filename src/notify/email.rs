// src/notify/email.rs
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{Notifier, OutboundMessage};
use crate::config::EmailConfig;
use crate::error::{RelayError, Result};

pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailNotifier {
    /// SMTP credentials come from the env vars named in the config.
    pub fn from_config(cfg: &EmailConfig) -> Result<Self> {
        let user = std::env::var(&cfg.user_env)
            .map_err(|_| RelayError::Config(format!("{} missing", cfg.user_env)))?;
        let pass = std::env::var(&cfg.pass_env)
            .map_err(|_| RelayError::Config(format!("{} missing", cfg.pass_env)))?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.smtp_host)
            .map_err(|e| RelayError::Config(format!("invalid smtp_host: {e}")))?
            .credentials(Credentials::new(user, pass))
            .build();

        let from = cfg
            .from
            .parse()
            .map_err(|e| RelayError::Config(format!("invalid email from: {e}")))?;
        let to = cfg
            .to
            .parse()
            .map_err(|e| RelayError::Config(format!("invalid email to: {e}")))?;

        Ok(Self { mailer, from, to })
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn destination(&self) -> &str {
        "email"
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<()> {
        let mut body = msg.body.clone();
        if !msg.link.is_empty() {
            body.push_str(&format!("\n\n{}\n", msg.link));
        }

        let email = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(msg.title.clone())
            .header(header::ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| RelayError::dispatch("email", e))?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| RelayError::dispatch("email", e))?;
        Ok(())
    }
}
