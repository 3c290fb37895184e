//! Persisted email records.
//!
//! One record per recipient of a [`Message`](crate::Message). A record is
//! pending while `sent_at` is unset; `error` is only ever set together with
//! `sent_at` and marks a permanent refusal.

mod model;
mod repository;

pub use model::{EmailId, EmailRecord, NewEmail, fan_out};
pub use repository::EmailRepository;
