//! Outgoing messages.
//!
//! A [`Message`] exists only between the caller and fan-out; what gets stored
//! is one [`EmailRecord`](crate::EmailRecord) per recipient.

use std::fmt;

use mailcourier_mime::{MessageBuilder, quote_phrase};

/// A sender: address plus optional display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name, if any.
    pub name: Option<String>,
    /// Email address.
    pub address: String,
}

impl Mailbox {
    /// Creates a mailbox from its parts. An empty name counts as no name;
    /// the address is trimmed and loses one pair of surrounding brackets.
    #[must_use]
    pub fn new(name: Option<String>, address: impl Into<String>) -> Self {
        let address = address.into();
        let trimmed = address.trim();
        let bare = trimmed
            .strip_prefix('<')
            .and_then(|a| a.strip_suffix('>'))
            .unwrap_or(trimmed)
            .trim();
        Self {
            name: name.filter(|n| !n.is_empty()),
            address: bare.to_string(),
        }
    }

    /// Parses `addr` or `Name <addr>`.
    ///
    /// A value ending in `>` is split at the last `<`: the text before it is
    /// the display name (trimmed, surrounding double quotes removed with
    /// their backslash escapes, empty meaning none) and the text inside the
    /// brackets is the address. Any other value is taken whole as the address.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if let Some(inner) = value.strip_suffix('>')
            && let Some(open) = inner.rfind('<')
        {
            let name = inner[..open].trim();
            let name = match name.strip_prefix('"').and_then(|n| n.strip_suffix('"')) {
                Some(quoted) => unescape(quoted),
                None => name.to_string(),
            };
            return Self::new(Some(name), &inner[open + 1..]);
        }
        Self::new(None, value)
    }
}

fn unescape(quoted: &str) -> String {
    let mut name = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => name.extend(chars.next()),
            c => name.push(c),
        }
    }
    name
}

impl From<&str> for Mailbox {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<String> for Mailbox {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} <{}>", quote_phrase(name), self.address),
            None => f.write_str(&self.address),
        }
    }
}

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name shown to the recipient.
    pub filename: String,
    /// MIME type, e.g. `application/pdf`.
    pub content_type: String,
    /// Raw payload.
    pub data: Vec<u8>,
}

impl Attachment {
    /// Creates an attachment.
    #[must_use]
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }
}

/// An email to one or more recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Sender.
    pub sender: Mailbox,
    /// Recipient addresses, in order.
    pub recipients: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub text: Option<String>,
    /// HTML body.
    pub html: Option<String>,
    /// Attachments, in order.
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Creates a message with no recipients and no body.
    #[must_use]
    pub fn new(sender: impl Into<Mailbox>, subject: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            recipients: Vec::new(),
            subject: subject.into(),
            text: None,
            html: None,
            attachments: Vec::new(),
        }
    }

    /// Adds a recipient.
    #[must_use]
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.recipients.push(recipient.into());
        self
    }

    /// Sets the plain-text body.
    #[must_use]
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.text = Some(body.into());
        self
    }

    /// Sets the HTML body.
    #[must_use]
    pub fn html(mut self, body: impl Into<String>) -> Self {
        self.html = Some(body.into());
        self
    }

    /// Adds an attachment.
    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Renders the message as RFC 5322 text.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no recipients, an attachment has an
    /// unparseable content type, or a header value contains a line break.
    pub fn render(&self) -> mailcourier_mime::Result<String> {
        let mut builder = match &self.sender.name {
            Some(name) => MessageBuilder::new().from_named(name, &self.sender.address),
            None => MessageBuilder::new().from(&self.sender.address),
        };
        builder = builder.subject(&self.subject);
        for recipient in &self.recipients {
            builder = builder.to(recipient);
        }
        if let Some(text) = &self.text {
            builder = builder.text_body(text);
        }
        if let Some(html) = &self.html {
            builder = builder.html_body(html);
        }
        for attachment in &self.attachments {
            builder = builder.attach(mailcourier_mime::Attachment::new(
                &attachment.filename,
                &attachment.content_type,
                attachment.data.clone(),
            )?);
        }
        builder.build()
    }
}
