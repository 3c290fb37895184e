//! EHLO keywords.

/// A service extension advertised in the EHLO reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extension {
    /// STARTTLS (RFC 3207).
    StartTls,
    /// AUTH with the mechanisms offered (RFC 4954).
    Auth(Vec<AuthMechanism>),
    /// SIZE with the optional maximum message size (RFC 1870).
    Size(Option<usize>),
    /// 8BITMIME (RFC 6152).
    EightBitMime,
    /// PIPELINING (RFC 2920).
    Pipelining,
    /// SMTPUTF8 (RFC 6531).
    SmtpUtf8,
    /// Any other keyword, uppercased.
    Other(String),
}

impl Extension {
    /// Parses one line of an EHLO reply (after the code).
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let keyword = words.next().unwrap_or_default().to_ascii_uppercase();

        match keyword.as_str() {
            "STARTTLS" => Self::StartTls,
            "AUTH" => Self::Auth(words.filter_map(AuthMechanism::parse).collect()),
            "SIZE" => Self::Size(words.next().and_then(|s| s.parse().ok()).filter(|&n| n > 0)),
            "8BITMIME" => Self::EightBitMime,
            "PIPELINING" => Self::Pipelining,
            "SMTPUTF8" => Self::SmtpUtf8,
            _ => Self::Other(keyword),
        }
    }
}

/// SASL mechanisms this client can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMechanism {
    /// PLAIN (RFC 4616).
    Plain,
    /// LOGIN (draft-murchison-sasl-login).
    Login,
}

impl AuthMechanism {
    /// Parses a mechanism name; unknown mechanisms yield `None`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "LOGIN" => Some(Self::Login),
            _ => None,
        }
    }

    /// Returns the mechanism name as sent in `AUTH`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
        }
    }
}
