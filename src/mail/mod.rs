use lettre::message::MultiPart;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

use crate::config::{MailConfig, SmtpConfig};
use crate::event::AlarmEvent;

mod message;
pub use message::{compose_message, MessageContent};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
    #[error("address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("message build error: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("event for point '{0}' has no recipients")]
    NoRecipients(String),
}

/// SMTP notification transport. The relay is resolved once at startup;
/// authentication happens per delivery inside lettre's connection handling.
pub struct MailClient {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: String,
    archiver_urls: Vec<String>,
}

impl MailClient {
    pub fn new(smtp: &SmtpConfig, mail: &MailConfig) -> Result<Self, MailError> {
        let mut builder = if smtp.tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)?
        };
        builder = builder
            .port(smtp.port)
            .credentials(Credentials::new(smtp.login.clone(), smtp.password.clone()));

        Ok(Self {
            transport: builder.build(),
            sender: smtp.sender().to_string(),
            archiver_urls: mail.archiver_urls.clone(),
        })
    }

    pub async fn send(&self, event: &AlarmEvent) -> Result<(), MailError> {
        if event.recipients.is_empty() {
            return Err(MailError::NoRecipients(event.point.clone()));
        }

        let content = compose_message(event, &self.archiver_urls);

        let mut builder = Message::builder()
            .from(self.sender.parse()?)
            .subject(event.subject.clone());
        for recipient in &event.recipients {
            builder = builder.to(recipient.trim().parse()?);
        }
        let message =
            builder.multipart(MultiPart::alternative_plain_html(content.text, content.html))?;

        self.transport.send(message).await?;
        log::info!(
            "mail_sent point={} recipients={}",
            event.point,
            event.recipients.len()
        );
        Ok(())
    }
}
