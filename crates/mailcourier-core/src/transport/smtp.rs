//! SMTP transport over `mailcourier-smtp`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mailcourier_smtp::connection::{connect, connect_tls};
use mailcourier_smtp::{Address, Client, Envelope};

use super::{RejectStage, Transport, TransportConnection, TransportError};
use crate::config::{Security, SmtpSettings};
use crate::message::{Mailbox, Message};

/// Sends through an SMTP submission server.
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    settings: Arc<SmtpSettings>,
}

impl SmtpTransport {
    /// Creates a transport for the given server.
    #[must_use]
    pub fn new(settings: SmtpSettings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }

    /// Returns the server settings.
    #[must_use]
    pub fn settings(&self) -> &SmtpSettings {
        &self.settings
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn connect(&self) -> Result<Box<dyn TransportConnection>, TransportError> {
        let client = bounded(self.settings.timeout(), open(&self.settings)).await?;
        tracing::debug!(
            host = %self.settings.host,
            port = self.settings.port(),
            tls = client.is_tls(),
            "SMTP session opened"
        );
        Ok(Box::new(SmtpConnection {
            settings: Arc::clone(&self.settings),
            client: Some(client),
            closed: false,
        }))
    }
}

/// One SMTP session. A session lost to a hard error is reopened on the next send.
struct SmtpConnection {
    settings: Arc<SmtpSettings>,
    client: Option<Client>,
    closed: bool,
}

#[async_trait]
impl TransportConnection for SmtpConnection {
    async fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        let envelope = envelope(message)?;
        let body = message
            .render()
            .map_err(|e| rejected(RejectStage::Data, 554, e.to_string()))?;

        let limit = self.settings.timeout();
        let mut client = match self.client.take() {
            Some(client) => client,
            None => {
                tracing::debug!(host = %self.settings.host, "reopening SMTP session");
                bounded(limit, open(&self.settings)).await?
            }
        };

        let outcome = bounded(limit, client.send_mail(&envelope, body.as_bytes())).await;
        match outcome {
            Ok(refused) => {
                for refusal in &refused {
                    tracing::warn!(
                        recipient = %refusal.address,
                        reply = %refusal.reply,
                        "recipient refused"
                    );
                }
                self.client = Some(client);
                Ok(())
            }
            Err(e) if e.is_rejection() => {
                self.client = Some(client);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        if let Some(client) = self.client.take() {
            bounded(self.settings.timeout(), client.quit()).await?;
        }
        Ok(())
    }
}

/// Connects, greets, secures and authenticates per the settings.
async fn open(settings: &SmtpSettings) -> mailcourier_smtp::Result<Client> {
    let host = settings.host.as_str();
    let port = settings.port();

    let stream = match settings.security {
        Security::Tls => connect_tls(host, port).await?,
        Security::StartTls | Security::None => connect(host, port).await?,
    };

    let mut client = Client::from_stream(stream).await?;
    client.ehlo(&settings.hello_name).await?;
    if settings.security == Security::StartTls {
        client = client.starttls(host).await?;
    }
    if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
        client.authenticate(username, password).await?;
    }
    Ok(client)
}

async fn bounded<T>(
    limit: Duration,
    operation: impl Future<Output = mailcourier_smtp::Result<T>>,
) -> Result<T, TransportError> {
    tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| TransportError::Timeout(limit))?
        .map_err(TransportError::from)
}

/// Recipients may carry a display name; only the bare address reaches
/// `RCPT TO`. Malformed addresses can never be delivered, so they count as
/// refusals.
fn envelope(message: &Message) -> Result<Envelope, TransportError> {
    let from = Address::new(message.sender.address.as_str()).map_err(|_| {
        rejected(
            RejectStage::Sender,
            501,
            format!("invalid sender address {:?}", message.sender.address),
        )
    })?;

    let to = message
        .recipients
        .iter()
        .map(|recipient| {
            Address::new(Mailbox::parse(recipient).address).map_err(|_| {
                rejected(
                    RejectStage::Recipients,
                    501,
                    format!("invalid recipient address {recipient:?}"),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Envelope::new(from, to))
}

fn rejected(stage: RejectStage, code: u16, message: String) -> TransportError {
    TransportError::Rejected {
        stage,
        code,
        message,
    }
}
