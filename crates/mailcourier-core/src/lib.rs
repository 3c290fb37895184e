//! # mailcourier-core
//!
//! Persistent email dispatch with deferred delivery and rate limiting.
//!
//! Every outgoing [`Message`] is fanned out into one [`EmailRecord`] per
//! recipient and stored before any delivery attempt. A record stays pending
//! until the transport either accepts it or refuses it outright; transient
//! failures leave it pending so a later attempt picks it up.
//!
//! This crate provides:
//! - [`EmailRepository`]: `SQLite` storage for records and attachments
//! - [`RateLimiter`]: per-minute, per-hour and per-day admission control
//! - [`Transport`]: the delivery seam, with [`SmtpTransport`] as the real one
//! - [`DeliveryEngine`]: fan-out, scheduling and the per-record send path
//! - [`Worker`]: the background cycle that drains due records
//! - [`Dispatcher`]: the host-facing facade tying it together
//!
//! ## Example
//!
//! ```ignore
//! use mailcourier_core::{DispatchConfig, Dispatcher, Message};
//!
//! let config = DispatchConfig::load(&path)?;
//! let dispatcher = Dispatcher::connect(&config).await?;
//! dispatcher.start_worker();
//!
//! let message = Message::new("Billing <billing@example.com>", "Your invoice")
//!     .to("alice@example.com")
//!     .text("See attached.");
//! dispatcher.schedule(&message, None).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod dispatcher;
pub mod engine;
mod error;
pub mod limit;
pub mod message;
pub mod record;
pub mod transport;
pub mod worker;

pub use config::{DispatchConfig, Security, SmtpSettings};
pub use dispatcher::Dispatcher;
pub use engine::{DeliveryEngine, DeliveryStatus, Dispatch};
pub use error::{Error, Result};
pub use limit::{RateLimitExceeded, RateLimiter, RateLimits, Window};
pub use message::{Attachment, Mailbox, Message};
pub use record::{EmailId, EmailRecord, EmailRepository, NewEmail, fan_out};
pub use transport::{
    RejectStage, SmtpTransport, Transport, TransportConnection, TransportError,
};
pub use worker::{CycleReport, Worker};
