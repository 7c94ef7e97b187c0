use async_trait::async_trait;
use tracing::info;

use crate::config::SmtpConfig;

/// Outbound notification contract: deliver one message to one address.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Development mailer: logs instead of delivering.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        info!(to = %to, subject = %subject, "email dispatch (log mode)");
        info!("{body}");
        Ok(())
    }
}

#[cfg(feature = "email")]
pub struct SmtpMailer {
    transport: lettre::AsyncSmtpTransport<lettre::Tokio1Executor>,
    from: lettre::message::Mailbox,
}

#[cfg(feature = "email")]
impl SmtpMailer {
    pub fn new(host: &str, username: &str, password: &str, from: &str) -> anyhow::Result<Self> {
        use lettre::transport::smtp::authentication::Credentials;

        let transport = lettre::AsyncSmtpTransport::<lettre::Tokio1Executor>::relay(host)?
            .credentials(Credentials::new(username.into(), password.into()))
            .build();
        Ok(Self {
            transport,
            from: from.parse()?,
        })
    }
}

#[cfg(feature = "email")]
#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        use lettre::AsyncTransport;

        let message = lettre::Message::builder()
            .from(self.from.clone())
            .to(to.parse()?)
            .subject(subject)
            .body(body.to_string())?;
        self.transport.send(message).await?;
        Ok(())
    }
}

/// Picks the SMTP mailer when fully configured and the `email` feature is
/// on, the log mailer otherwise.
pub fn from_config(config: &SmtpConfig) -> anyhow::Result<Box<dyn Mailer>> {
    #[cfg(feature = "email")]
    if let (Some(host), Some(username), Some(password), Some(from)) = (
        config.host.as_deref(),
        config.username.as_deref(),
        config.password.as_deref(),
        config.from_address.as_deref(),
    ) {
        return Ok(Box::new(SmtpMailer::new(host, username, password, from)?));
    }

    let _ = config;
    Ok(Box::new(LogMailer))
}
