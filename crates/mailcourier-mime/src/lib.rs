//! # mailcourier-mime
//!
//! Renders outgoing email into RFC 5322 / MIME wire format.
//!
//! ## Features
//!
//! - **Alternatives**: plain text, HTML, or both as `multipart/alternative`
//! - **Attachments**: wrapped in `multipart/mixed`, Base64 encoded
//! - **Header encoding**: RFC 2047 encoded-words for non-ASCII names and subjects
//! - **Header safety**: CR/LF in header values is rejected
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailcourier_mime::{Attachment, MessageBuilder};
//!
//! let rendered = MessageBuilder::new()
//!     .from_named("Alice", "alice@example.com")
//!     .to("bob@example.com")
//!     .subject("Quarterly report")
//!     .text_body("See attached.")
//!     .html_body("<p>See attached.</p>")
//!     .attach(Attachment::new("report.pdf", "application/pdf", pdf_bytes)?)
//!     .build()?;
//!
//! stream.write_all(rendered.as_bytes()).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod builder;
mod content_type;
mod error;
mod header;

pub mod encoding;

pub use builder::{Attachment, MessageBuilder, format_mailbox, quote_phrase};
pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::Headers;
