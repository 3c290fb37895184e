//! SMTP protocol types.

mod address;
mod extension;
mod reply;

pub use address::{Address, Envelope, Refused};
pub use extension::{AuthMechanism, Extension};
pub use reply::{Reply, ReplyClass, ReplyCode};
