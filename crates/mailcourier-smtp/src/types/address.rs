//! Envelope addresses.

use crate::error::{Error, Result};
use crate::types::Reply;
use std::fmt;

/// A validated envelope address (the part between `<` and `>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Validates and wraps an address.
    ///
    /// Only the shape needed to keep the command line well-formed is checked:
    /// one unquoted `@` with a non-empty local part and domain, and no
    /// whitespace, angle brackets or control characters.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidAddress` if the address is malformed.
    pub fn new(address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        let invalid = || Error::InvalidAddress(address.clone());

        if address.len() > 254
            || address
                .chars()
                .any(|c| c.is_whitespace() || c.is_control() || c == '<' || c == '>')
        {
            return Err(invalid());
        }

        let (local, domain) = address.rsplit_once('@').ok_or_else(invalid)?;
        let quoted = local.len() >= 2 && local.starts_with('"') && local.ends_with('"');
        if local.is_empty() || local.len() > 64 || domain.is_empty() {
            return Err(invalid());
        }
        if !quoted && local.contains('@') {
            return Err(invalid());
        }
        if domain.starts_with('.') || domain.ends_with('.') || domain.contains("..") {
            return Err(invalid());
        }

        Ok(Self(address))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for Address {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

/// Reverse path and forward paths of one mail transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Sender (`MAIL FROM`).
    pub from: Address,
    /// Recipients (`RCPT TO`), in order.
    pub to: Vec<Address>,
}

impl Envelope {
    /// Creates an envelope.
    #[must_use]
    pub const fn new(from: Address, to: Vec<Address>) -> Self {
        Self { from, to }
    }
}

/// A recipient the server refused while others were accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refused {
    /// The refused recipient.
    pub address: Address,
    /// The server's answer to `RCPT TO`.
    pub reply: Reply,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_addresses() {
        assert!(Address::new("user@example.com").is_ok());
        assert!(Address::new("first.last+tag@mail.example.org").is_ok());
        assert!(Address::new("\"odd\"@example.com").is_ok());
        assert!(Address::new("\"a@b\"@example.com").is_ok());
    }

    #[test]
    fn test_invalid_addresses() {
        for bad in [
            "",
            "plain",
            "@example.com",
            "user@",
            "user@@example.com",
            "a@b@example.com",
            "user@.example.com",
            "user@example..com",
            "us er@example.com",
            "user@example.com>",
            "user@example.com\r\nRCPT TO:<x@y>",
        ] {
            assert!(Address::new(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_local_part_too_long() {
        let local = "a".repeat(65);
        assert!(Address::new(format!("{local}@example.com")).is_err());
    }
}
