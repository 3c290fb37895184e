//! Delivery transports.
//!
//! A [`Transport`] opens connections; a [`TransportConnection`] sends
//! messages until it is closed. The worker keeps one connection for a whole
//! cycle, a foreground send opens one per record.
//!
//! Failures fall in two groups. [`TransportError::Rejected`] means the server
//! refused the sender, the recipients or the message: retrying will not help,
//! so the record is marked sent with the reason. Everything else leaves the
//! record pending for a later attempt.

mod smtp;

pub use smtp::SmtpTransport;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::message::Message;

/// Opens connections to a mail server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a connection ready to send.
    async fn connect(&self) -> Result<Box<dyn TransportConnection>, TransportError>;
}

/// An open connection able to send several messages.
#[async_trait]
pub trait TransportConnection: Send {
    /// Sends one message to all its recipients.
    async fn send(&mut self, message: &Message) -> Result<(), TransportError>;

    /// Ends the session. Further sends fail.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Which part of the message was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectStage {
    /// The sender (`MAIL FROM`).
    Sender,
    /// Every recipient (`RCPT TO`).
    Recipients,
    /// The message content (`DATA`).
    Data,
}

impl fmt::Display for RejectStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sender => "sender refused",
            Self::Recipients => "recipients refused",
            Self::Data => "data refused",
        })
    }
}

/// Transport failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The message can never be delivered as it is: the server refused it,
    /// or an address or the content was unusable before it got that far.
    #[error("{stage} ({code}): {message}")]
    Rejected {
        /// What was refused.
        stage: RejectStage,
        /// SMTP reply code.
        code: u16,
        /// Server text.
        message: String,
    },

    /// Connection, TLS, authentication or protocol failure.
    #[error("SMTP error: {0}")]
    Smtp(mailcourier_smtp::Error),

    /// The server did not answer in time.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The connection was already closed.
    #[error("Connection closed")]
    Closed,

    /// Any other failure, for transports outside this crate.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns true if the server refused the message itself.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

impl From<mailcourier_smtp::Error> for TransportError {
    fn from(err: mailcourier_smtp::Error) -> Self {
        use mailcourier_smtp::{Error, Stage};

        let stage = match &err {
            Error::Reply {
                stage: Stage::MailFrom,
                ..
            } => RejectStage::Sender,
            Error::Reply {
                stage: Stage::RcptTo,
                ..
            } => RejectStage::Recipients,
            Error::Reply {
                stage: Stage::Data, ..
            } => RejectStage::Data,
            _ => return Self::Smtp(err),
        };

        let reply = err.server_reply();
        Self::Rejected {
            stage,
            code: reply.map_or(0, |r| r.code.as_u16()),
            message: reply.map(mailcourier_smtp::Reply::message_text).unwrap_or_default(),
        }
    }
}
