//! Error types for SMTP operations.

use crate::types::Reply;
use std::fmt;
use std::io;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Point in the session at which the server answered negatively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Initial 220 greeting.
    Greeting,
    /// EHLO / HELO.
    Hello,
    /// STARTTLS negotiation.
    StartTls,
    /// AUTH exchange.
    Auth,
    /// MAIL FROM (sender refused).
    MailFrom,
    /// RCPT TO (recipients refused).
    RcptTo,
    /// DATA command or end-of-data reply (message refused).
    Data,
    /// RSET.
    Reset,
    /// NOOP.
    Noop,
    /// QUIT.
    Quit,
}

impl Stage {
    /// Returns true for the stages of a mail transaction.
    #[must_use]
    pub const fn is_transaction(self) -> bool {
        matches!(self, Self::MailFrom | Self::RcptTo | Self::Data)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Greeting => "greeting",
            Self::Hello => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::Auth => "AUTH",
            Self::MailFrom => "MAIL FROM",
            Self::RcptTo => "RCPT TO",
            Self::Data => "DATA",
            Self::Reset => "RSET",
            Self::Noop => "NOOP",
            Self::Quit => "QUIT",
        };
        f.write_str(name)
    }
}

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Server closed the connection mid-reply.
    #[error("Connection closed by server")]
    ConnectionClosed,

    /// Server answered a command negatively.
    #[error("SMTP error at {stage}: {reply}")]
    Reply {
        /// Where in the session the reply arrived.
        stage: Stage,
        /// The negative reply.
        reply: Reply,
    },

    /// Protocol error (unexpected or malformed response).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Feature not supported by server.
    #[error("Server does not support {0}")]
    NotSupported(String),
}

impl Error {
    /// Creates a reply error for a stage.
    #[must_use]
    pub const fn reply(stage: Stage, reply: Reply) -> Self {
        Self::Reply { stage, reply }
    }

    /// Returns the negative reply, if this error carries one.
    #[must_use]
    pub const fn server_reply(&self) -> Option<&Reply> {
        match self {
            Self::Reply { reply, .. } => Some(reply),
            _ => None,
        }
    }

    /// Returns true if the server refused the sender, the recipients or the
    /// message data of a mail transaction.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Reply { stage, .. } if stage.is_transaction())
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Reply { reply, .. } if reply.code.is_permanent())
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Reply { reply, .. } if reply.code.is_transient())
    }
}
