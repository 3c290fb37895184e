//! SMTP connection management.

mod client;
mod stream;

pub use client::Client;
pub use stream::{SmtpStream, connect, connect_tls};

use crate::types::{AuthMechanism, Extension};

/// What the server told us about itself in its greeting and EHLO reply.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Text of the 220 greeting.
    pub greeting: String,
    /// Extensions from the last EHLO reply, in advertised order.
    pub extensions: Vec<Extension>,
}

impl ServerInfo {
    /// Checks if the server advertised an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Returns the advertised SIZE extension, if any.
    ///
    /// The outer `Option` tells whether SIZE was advertised at all, the inner
    /// one carries the limit.
    #[must_use]
    pub fn size(&self) -> Option<Option<usize>> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::Size(limit) => Some(*limit),
            _ => None,
        })
    }

    /// Returns the advertised authentication mechanisms.
    #[must_use]
    pub fn auth_mechanisms(&self) -> &[AuthMechanism] {
        self.extensions
            .iter()
            .find_map(|ext| match ext {
                Extension::Auth(mechanisms) => Some(mechanisms.as_slice()),
                _ => None,
            })
            .unwrap_or_default()
    }
}
