//! Email record data model.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::message::{Attachment, Mailbox, Message};

/// Row id of an email record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EmailId(pub i64);

impl fmt::Display for EmailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A record about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEmail {
    /// Sender.
    pub sender: Mailbox,
    /// The single recipient of this record.
    pub recipient: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub message_txt: Option<String>,
    /// HTML body.
    pub message_html: Option<String>,
    /// Earliest time the worker may send it.
    pub scheduled_at: DateTime<Utc>,
}

/// A stored email to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailRecord {
    /// Row id.
    pub id: EmailId,
    /// Sender.
    pub sender: Mailbox,
    /// The single recipient.
    pub recipient: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub message_txt: Option<String>,
    /// HTML body.
    pub message_html: Option<String>,
    /// Attachments shared with the other records of the same message.
    pub attachments: Vec<Attachment>,
    /// Earliest time the worker may send it.
    pub scheduled_at: DateTime<Utc>,
    /// When the transport accepted or permanently refused it.
    pub sent_at: Option<DateTime<Utc>>,
    /// Permanent refusal reason.
    pub error: Option<String>,
}

impl EmailRecord {
    /// Returns true while no outcome has been recorded.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.sent_at.is_none()
    }

    /// Returns true if the record is pending and its scheduled time has come.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.scheduled_at <= now
    }

    /// Rebuilds the single-recipient message this record was fanned out from.
    #[must_use]
    pub fn message(&self) -> Message {
        Message {
            sender: self.sender.clone(),
            recipients: vec![self.recipient.clone()],
            subject: self.subject.clone(),
            text: self.message_txt.clone(),
            html: self.message_html.clone(),
            attachments: self.attachments.clone(),
        }
    }
}

/// Splits a message into one draft per recipient.
///
/// Recipients are kept in order and never deduplicated. A message without
/// recipients yields no drafts.
#[must_use]
pub fn fan_out(message: &Message, scheduled_at: DateTime<Utc>) -> Vec<NewEmail> {
    message
        .recipients
        .iter()
        .map(|recipient| NewEmail {
            sender: message.sender.clone(),
            recipient: recipient.clone(),
            subject: message.subject.clone(),
            message_txt: message.text.clone(),
            message_html: message.html.clone(),
            scheduled_at,
        })
        .collect()
}
