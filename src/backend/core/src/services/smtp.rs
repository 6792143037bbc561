//! Admin email over SMTP.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use super::{bounded, Mailer};
use crate::config::EmailConfig;
use crate::error::{ErrorCode, Result, SkyreelError};

/// Sends plain-text mail to every configured admin.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_mailbox: Mailbox,
    admins: Vec<Mailbox>,
    config: EmailConfig,
}

impl SmtpMailer {
    #[tracing::instrument(
        name = "smtp_mailer_new",
        skip(config),
        fields(host = ?config.smtp_host, port = config.smtp_port, use_tls = config.use_tls)
    )]
    pub fn new(config: EmailConfig) -> Result<Self> {
        let host = config.smtp_host.clone().ok_or_else(|| {
            SkyreelError::new(ErrorCode::ConfigurationError, "SMTP host is not configured")
        })?;

        let from_mailbox: Mailbox =
            format!("{} <{}>", config.from_name, config.from_address).parse()?;

        let admins = config
            .admins
            .iter()
            .map(|a| a.parse::<Mailbox>())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&host)
        };

        let mut builder = builder.port(config.smtp_port).timeout(Some(config.timeout()));

        if let (Some(username), Some(password)) = (config.username.clone(), config.password.clone()) {
            builder = builder.credentials(Credentials::new(username, password));
        }

        tracing::debug!(admins = admins.len(), "SMTP mailer initialized");

        Ok(Self {
            transport: builder.build(),
            from_mailbox,
            admins,
            config,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_to_admins(&self, subject: &str, body: &str) -> Result<()> {
        if self.admins.is_empty() {
            tracing::warn!(subject, "No admin recipients configured, email not sent");
            return Ok(());
        }

        let mut failures = 0usize;
        for admin in &self.admins {
            let message = Message::builder()
                .from(self.from_mailbox.clone())
                .to(admin.clone())
                .subject(subject)
                .header(ContentType::TEXT_PLAIN)
                .body(body.to_string())?;

            let sent = bounded("smtp send", self.config.timeout(), async {
                self.transport.send(message).await?;
                Ok(())
            })
            .await;

            match sent {
                Ok(()) => {
                    metrics::counter!("skyreel_emails_sent_total").increment(1);
                    tracing::info!(to = %admin, subject, "Admin email sent");
                }
                Err(e) => {
                    failures += 1;
                    tracing::error!(to = %admin, subject, error = %e, "Admin email failed");
                }
            }
        }

        if failures == self.admins.len() {
            return Err(SkyreelError::with_internal(
                ErrorCode::EmailError,
                "Unable to send admin email",
                format!("all {} recipients failed", failures),
            ));
        }
        Ok(())
    }
}

/// Mailer used when SMTP is not configured; logs messages instead.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_to_admins(&self, subject: &str, body: &str) -> Result<()> {
        tracing::warn!(subject, body, "Email disabled, admin message logged only");
        Ok(())
    }
}
