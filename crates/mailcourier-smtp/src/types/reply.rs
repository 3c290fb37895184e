//! SMTP reply types.

use std::fmt;

/// A complete (possibly multiline) reply from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code shared by every line.
    pub code: ReplyCode,
    /// Text of each line, without the code and separator.
    pub lines: Vec<String>,
}

impl Reply {
    /// Creates a new reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(code: ReplyCode, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// Returns true if this is a completion reply (2xx).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code.class(), ReplyClass::Completion)
    }

    /// Returns the text of all lines joined by a space.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.lines.join(" ")
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message_text())
    }
}

/// First digit of a reply code (RFC 5321 section 4.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClass {
    /// 2yz
    Completion,
    /// 3yz
    Intermediate,
    /// 4yz
    TransientFailure,
    /// 5yz
    PermanentFailure,
    /// Anything outside 200..=599.
    Unknown,
}

/// SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// 220 Service ready.
    pub const SERVICE_READY: Self = Self(220);
    /// 221 Service closing transmission channel.
    pub const CLOSING: Self = Self(221);
    /// 235 Authentication succeeded.
    pub const AUTH_SUCCESS: Self = Self(235);
    /// 250 Requested action completed.
    pub const OK: Self = Self(250);
    /// 334 Server challenge during AUTH.
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 Start mail input.
    pub const START_DATA: Self = Self(354);
    /// 421 Service not available, closing channel.
    pub const SERVICE_UNAVAILABLE: Self = Self(421);
    /// 500 Syntax error, command unrecognized.
    pub const SYNTAX_ERROR: Self = Self(500);
    /// 502 Command not implemented.
    pub const NOT_IMPLEMENTED: Self = Self(502);

    /// Creates a new reply code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns the class given by the first digit.
    #[must_use]
    pub const fn class(self) -> ReplyClass {
        match self.0 / 100 {
            2 => ReplyClass::Completion,
            3 => ReplyClass::Intermediate,
            4 => ReplyClass::TransientFailure,
            5 => ReplyClass::PermanentFailure,
            _ => ReplyClass::Unknown,
        }
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self.class(), ReplyClass::TransientFailure)
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        matches!(self.class(), ReplyClass::PermanentFailure)
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classes() {
        assert_eq!(ReplyCode::OK.class(), ReplyClass::Completion);
        assert_eq!(ReplyCode::START_DATA.class(), ReplyClass::Intermediate);
        assert_eq!(ReplyCode::SERVICE_UNAVAILABLE.class(), ReplyClass::TransientFailure);
        assert_eq!(ReplyCode::new(554).class(), ReplyClass::PermanentFailure);
        assert_eq!(ReplyCode::new(999).class(), ReplyClass::Unknown);
    }

    #[test]
    fn test_message_text_joins_lines() {
        let reply = Reply::new(
            ReplyCode::new(550),
            vec!["5.1.1 Mailbox unavailable".into(), "see docs".into()],
        );
        assert!(!reply.is_success());
        assert_eq!(reply.message_text(), "5.1.1 Mailbox unavailable see docs");
        assert_eq!(reply.to_string(), "550 5.1.1 Mailbox unavailable see docs");
    }
}
