//! # mailcourier-smtp
//!
//! An SMTP submission client (RFC 5321) built for queue draining: one
//! connection carries any number of mail transactions, and every server
//! refusal is reported together with the transaction stage it happened in.
//!
//! ## Features
//!
//! - **Session reuse**: `send_mail` can be called repeatedly; a refused
//!   transaction is reset with `RSET` so the next one starts clean
//! - **Rejection stages**: `MAIL FROM`, `RCPT TO` and `DATA` refusals are
//!   distinguishable from connection, TLS and protocol failures
//! - **TLS support**: implicit TLS (port 465) and STARTTLS
//! - **Authentication**: PLAIN and LOGIN
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailcourier_smtp::{Address, Client, Envelope};
//! use mailcourier_smtp::connection::connect;
//!
//! let stream = connect("smtp.example.com", 587).await?;
//! let mut client = Client::from_stream(stream).await?;
//! client.ehlo("client.example.com").await?;
//! let mut client = client.starttls("smtp.example.com").await?;
//! client.authenticate("user@example.com", "password").await?;
//!
//! let envelope = Envelope::new(
//!     Address::new("sender@example.com")?,
//!     vec![Address::new("recipient@example.com")?],
//! );
//! client.send_mail(&envelope, b"Subject: Test\r\n\r\nHello\r\n").await?;
//! client.quit().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use connection::{Client, ServerInfo};
pub use error::{Error, Result, Stage};
pub use types::{Address, AuthMechanism, Envelope, Extension, Reply, ReplyCode, Refused};
