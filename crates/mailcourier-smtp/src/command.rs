//! SMTP commands.

use crate::types::{Address, AuthMechanism};
use std::fmt;

/// A command line sent to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// HELO, for servers that reject EHLO.
    Helo(String),
    /// EHLO with the client's hostname.
    Ehlo(String),
    /// STARTTLS.
    StartTls,
    /// AUTH with an optional initial response (already base64).
    Auth {
        /// SASL mechanism.
        mechanism: AuthMechanism,
        /// Initial client response.
        initial_response: Option<String>,
    },
    /// A bare base64 line answering a 334 challenge.
    AuthResponse(String),
    /// MAIL FROM, with the SIZE parameter when the server advertises it.
    MailFrom {
        /// Reverse path.
        from: Address,
        /// Message size in bytes.
        size: Option<usize>,
    },
    /// RCPT TO.
    RcptTo(Address),
    /// DATA.
    Data,
    /// RSET.
    Rset,
    /// NOOP.
    Noop,
    /// QUIT.
    Quit,
}

impl Command {
    /// Returns the command verb, safe to log.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Helo(_) => "HELO",
            Self::Ehlo(_) => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::Auth { .. } => "AUTH",
            Self::AuthResponse(_) => "AUTH-RESPONSE",
            Self::MailFrom { .. } => "MAIL",
            Self::RcptTo(_) => "RCPT",
            Self::Data => "DATA",
            Self::Rset => "RSET",
            Self::Noop => "NOOP",
            Self::Quit => "QUIT",
        }
    }

    /// Serializes the command, including the trailing CRLF.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("{self}\r\n").into_bytes()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helo(host) => write!(f, "HELO {host}"),
            Self::Ehlo(host) => write!(f, "EHLO {host}"),
            Self::StartTls => f.write_str("STARTTLS"),
            Self::Auth {
                mechanism,
                initial_response: Some(response),
            } => write!(f, "AUTH {} {response}", mechanism.as_str()),
            Self::Auth {
                mechanism,
                initial_response: None,
            } => write!(f, "AUTH {}", mechanism.as_str()),
            Self::AuthResponse(response) => f.write_str(response),
            Self::MailFrom { from, size } => {
                write!(f, "MAIL FROM:<{from}>")?;
                if let Some(size) = size {
                    write!(f, " SIZE={size}")?;
                }
                Ok(())
            }
            Self::RcptTo(to) => write!(f, "RCPT TO:<{to}>"),
            Self::Data => f.write_str("DATA"),
            Self::Rset => f.write_str("RSET"),
            Self::Noop => f.write_str("NOOP"),
            Self::Quit => f.write_str("QUIT"),
        }
    }
}

/// Applies SMTP transparency to message data and appends the terminator.
///
/// Bare LF line endings are normalized to CRLF, every line that starts with
/// `.` gets an extra leading `.`, and the data ends with `CRLF.CRLF`.
#[must_use]
pub fn dot_stuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 64 + 5);
    let mut at_line_start = true;
    let mut prev = 0u8;

    for &byte in data {
        if byte == b'\n' && prev != b'\r' {
            out.push(b'\r');
        }
        if at_line_start && byte == b'.' {
            out.push(b'.');
        }
        out.push(byte);
        at_line_start = byte == b'\n';
        prev = byte;
    }

    if !out.is_empty() && !out.ends_with(b"\r\n") {
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b".\r\n");
    out
}
