//! Outgoing message rendering.

use crate::content_type::ContentType;
use crate::encoding::{encode_base64_lines, encode_quoted_printable, encode_rfc2047};
use crate::error::{Error, Result};
use crate::header::Headers;
use chrono::{DateTime, Utc};
use std::borrow::Cow;
use std::fmt::Write as _;

/// Characters that require a display name to be quoted (RFC 5322 `specials`).
const SPECIALS: &[char] = &[
    '(', ')', '<', '>', '[', ']', ':', ';', '@', '\\', ',', '.', '"',
];

/// A file attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    filename: String,
    content_type: ContentType,
    data: Vec<u8>,
}

impl Attachment {
    /// Creates an attachment.
    ///
    /// # Errors
    ///
    /// Returns an error if the content type cannot be parsed or the filename
    /// contains line breaks.
    pub fn new(
        filename: impl Into<String>,
        content_type: &str,
        data: impl Into<Vec<u8>>,
    ) -> Result<Self> {
        let filename = filename.into();
        Headers::check_value("filename", &filename)?;
        Ok(Self {
            filename,
            content_type: ContentType::parse(content_type)?,
            data: data.into(),
        })
    }

    /// Returns the file name.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Returns the content type.
    #[must_use]
    pub const fn content_type(&self) -> &ContentType {
        &self.content_type
    }

    /// Returns the raw payload.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Formats a mailbox for a header: `addr`, `Name <addr>` or
/// `"Quoted, Name" <addr>`. Non-ASCII names are RFC 2047 encoded.
#[must_use]
pub fn format_mailbox(name: Option<&str>, address: &str) -> String {
    let Some(name) = name.filter(|n| !n.is_empty()) else {
        return address.to_string();
    };

    let encoded = encode_rfc2047(name);
    if encoded == name {
        format!("{} <{address}>", quote_phrase(name))
    } else {
        format!("{encoded} <{address}>")
    }
}

/// Quotes a display name when it holds specials or edge whitespace, so the
/// name survives being split back out of `Name <addr>`.
#[must_use]
pub fn quote_phrase(name: &str) -> Cow<'_, str> {
    if name.contains(SPECIALS) || name.trim() != name {
        Cow::Owned(format!("\"{}\"", escape_quoted(name)))
    } else {
        Cow::Borrowed(name)
    }
}

fn escape_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Builder for an RFC 5322 message with optional alternatives and attachments.
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<(Option<String>, String)>,
    to: Vec<String>,
    subject: Option<String>,
    text: Option<String>,
    html: Option<String>,
    attachments: Vec<Attachment>,
    date: Option<DateTime<Utc>>,
    message_id: Option<String>,
    extra_headers: Vec<(String, String)>,
}

impl MessageBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sender address.
    #[must_use]
    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.from = Some((None, address.into()));
        self
    }

    /// Sets the sender address with a display name.
    #[must_use]
    pub fn from_named(mut self, name: impl Into<String>, address: impl Into<String>) -> Self {
        self.from = Some((Some(name.into()), address.into()));
        self
    }

    /// Adds a `To` recipient.
    #[must_use]
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to.push(address.into());
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the plain text alternative.
    #[must_use]
    pub fn text_body(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Sets the HTML alternative.
    #[must_use]
    pub fn html_body(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Adds an attachment.
    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Overrides the `Date` header (defaults to the time of [`build`](Self::build)).
    #[must_use]
    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Overrides the generated `Message-ID` header.
    #[must_use]
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Adds an extra header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    /// Renders the message.
    ///
    /// # Errors
    ///
    /// Returns an error if `From` or `To` is missing, or if any header value
    /// contains a line break.
    pub fn build(&self) -> Result<String> {
        let (name, address) = self.from.as_ref().ok_or(Error::MissingHeader("From"))?;
        if self.to.is_empty() {
            return Err(Error::MissingHeader("To"));
        }

        Headers::check_value("From", address)?;
        if let Some(name) = name {
            Headers::check_value("From", name)?;
        }
        for recipient in &self.to {
            Headers::check_value("To", recipient)?;
        }
        let subject = self.subject.as_deref().unwrap_or_default();
        Headers::check_value("Subject", subject)?;
        for (header, value) in &self.extra_headers {
            Headers::check_value(header, value)?;
        }

        let mut headers = Headers::new();
        headers.add("From", format_mailbox(name.as_deref(), address));
        headers.add("To", self.to.join(", "));
        headers.add("Subject", encode_rfc2047(subject));
        headers.add("Date", self.date.unwrap_or_else(Utc::now).to_rfc2822());
        let message_id = match &self.message_id {
            Some(id) => {
                Headers::check_value("Message-ID", id)?;
                id.clone()
            }
            None => generate_message_id(address),
        };
        headers.add("Message-ID", message_id);
        headers.add("MIME-Version", "1.0");
        for (header, value) in &self.extra_headers {
            headers.set(header.clone(), value.clone());
        }

        let mut rendered = headers.to_string();
        self.body().write_to(&mut rendered);
        Ok(rendered)
    }

    fn body(&self) -> Entity {
        let text = self.text.as_deref().map(|t| Entity::text(ContentType::text_plain(), t));
        let html = self.html.as_deref().map(|h| Entity::text(ContentType::text_html(), h));

        let content = match (text, html) {
            (Some(text), Some(html)) => Entity::multipart("alternative", vec![text, html]),
            (Some(single), None) | (None, Some(single)) => single,
            (None, None) => Entity::text(ContentType::text_plain(), ""),
        };

        if self.attachments.is_empty() {
            return content;
        }

        let mut parts = Vec::with_capacity(self.attachments.len() + 1);
        parts.push(content);
        parts.extend(self.attachments.iter().map(Entity::attachment));
        Entity::multipart("mixed", parts)
    }
}

/// A MIME entity in the rendered body tree.
enum Entity {
    Leaf { headers: Headers, content: String },
    Multipart { content_type: ContentType, parts: Vec<Entity> },
}

impl Entity {
    fn text(content_type: ContentType, text: &str) -> Self {
        let mut headers = Headers::new();
        headers.add("Content-Type", content_type.to_string());
        headers.add("Content-Transfer-Encoding", "quoted-printable");
        Self::Leaf {
            headers,
            content: encode_quoted_printable(text),
        }
    }

    fn attachment(attachment: &Attachment) -> Self {
        let filename = encode_rfc2047(&attachment.filename);
        let content_type = attachment
            .content_type
            .clone()
            .with_parameter("name", filename.clone());

        let mut headers = Headers::new();
        headers.add("Content-Type", content_type.to_string());
        headers.add(
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", escape_quoted(&filename)),
        );
        headers.add("Content-Transfer-Encoding", "base64");
        Self::Leaf {
            headers,
            content: encode_base64_lines(&attachment.data),
        }
    }

    fn multipart(sub_type: &str, parts: Vec<Self>) -> Self {
        Self::Multipart {
            content_type: ContentType::multipart(sub_type, generate_boundary()),
            parts,
        }
    }

    fn write_to(&self, out: &mut String) {
        match self {
            Self::Leaf { headers, content } => {
                let _ = write!(out, "{headers}\r\n{content}");
            }
            Self::Multipart {
                content_type,
                parts,
            } => {
                let boundary = content_type.boundary().unwrap_or_default();
                let _ = write!(out, "Content-Type: {content_type}\r\n\r\n");
                for part in parts {
                    let _ = write!(out, "--{boundary}\r\n");
                    part.write_to(out);
                    out.push_str("\r\n");
                }
                let _ = write!(out, "--{boundary}--\r\n");
            }
        }
    }
}

fn generate_boundary() -> String {
    // "=_" can never occur in quoted-printable or base64 output
    format!("=_mc_{:032x}", rand::random::<u128>())
}

fn generate_message_id(sender: &str) -> String {
    let domain = sender
        .rsplit_once('@')
        .map_or("localhost", |(_, domain)| domain);
    format!(
        "<{}.{:016x}@{domain}>",
        Utc::now().timestamp_micros(),
        rand::random::<u64>()
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base() -> MessageBuilder {
        MessageBuilder::new()
            .from("sender@example.com")
            .to("recipient@example.com")
            .subject("Test")
            .date(Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap())
            .message_id("<fixed@example.com>")
    }

    #[test]
    fn test_text_only() {
        let rendered = base().text_body("Hello, World!").build().unwrap();

        assert!(rendered.starts_with("From: sender@example.com\r\nTo: recipient@example.com\r\n"));
        assert!(rendered.contains("Subject: Test\r\n"));
        assert!(rendered.contains("Date: Mon, 19 Oct 2026 12:00:00 +0000\r\n"));
        assert!(rendered.contains("Message-ID: <fixed@example.com>\r\n"));
        assert!(rendered.contains("MIME-Version: 1.0\r\n"));
        assert!(rendered.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(rendered.ends_with("\r\n\r\nHello, World!"));
        assert!(!rendered.contains("multipart"));
    }

    #[test]
    fn test_html_only() {
        let rendered = base().html_body("<p>Hi</p>").build().unwrap();
        assert!(rendered.contains("Content-Type: text/html; charset=utf-8\r\n"));
        assert!(rendered.ends_with("<p>Hi</p>"));
    }

    #[test]
    fn test_no_body_is_empty_text() {
        let rendered = base().build().unwrap();
        assert!(rendered.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(rendered.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_alternative() {
        let rendered = base()
            .text_body("plain")
            .html_body("<b>rich</b>")
            .build()
            .unwrap();

        assert!(rendered.contains("Content-Type: multipart/alternative; boundary=\"=_mc_"));
        let text_at = rendered.find("text/plain").unwrap();
        let html_at = rendered.find("text/html").unwrap();
        assert!(text_at < html_at);
        assert!(rendered.trim_end().ends_with("--"));
    }

    #[test]
    fn test_attachments_wrap_in_mixed() {
        let attachment = Attachment::new("notes.txt", "text/plain", b"attached data".to_vec()).unwrap();
        let rendered = base()
            .text_body("body")
            .html_body("<p>body</p>")
            .attach(attachment)
            .build()
            .unwrap();

        let mixed = rendered.find("multipart/mixed").unwrap();
        let alternative = rendered.find("multipart/alternative").unwrap();
        assert!(mixed < alternative);
        assert!(rendered.contains("Content-Type: text/plain; name=notes.txt\r\n"));
        assert!(rendered.contains("Content-Disposition: attachment; filename=\"notes.txt\"\r\n"));
        assert!(rendered.contains("Content-Transfer-Encoding: base64\r\n"));
        assert!(rendered.contains("YXR0YWNoZWQgZGF0YQ=="));
    }

    #[test]
    fn test_display_name_quoting() {
        assert_eq!(format_mailbox(None, "a@x.com"), "a@x.com");
        assert_eq!(format_mailbox(Some(""), "a@x.com"), "a@x.com");
        assert_eq!(format_mailbox(Some("Alice"), "a@x.com"), "Alice <a@x.com>");
        assert_eq!(
            format_mailbox(Some("Doe, Jane"), "j@x.com"),
            "\"Doe, Jane\" <j@x.com>"
        );
        assert_eq!(
            format_mailbox(Some("Zoë"), "z@x.com"),
            "=?utf-8?B?Wm/Dqw==?= <z@x.com>"
        );
    }

    #[test]
    fn test_quote_phrase() {
        assert_eq!(quote_phrase("Alice"), "Alice");
        assert_eq!(quote_phrase(" Alice"), "\" Alice\"");
        assert_eq!(quote_phrase("\"Al\""), "\"\\\"Al\\\"\"");
        assert_eq!(quote_phrase("a\\b"), "\"a\\\\b\"");
    }

    #[test]
    fn test_non_ascii_subject_encoded() {
        let rendered = base().subject("Grüße").build().unwrap();
        assert!(rendered.contains("Subject: =?utf-8?B?R3LDvMOfZQ==?=\r\n"));
    }

    #[test]
    fn test_missing_from() {
        let err = MessageBuilder::new().to("a@example.com").build().unwrap_err();
        assert!(matches!(err, Error::MissingHeader("From")));
    }

    #[test]
    fn test_missing_to() {
        let err = MessageBuilder::new().from("a@example.com").build().unwrap_err();
        assert!(matches!(err, Error::MissingHeader("To")));
    }

    #[test]
    fn test_header_injection_rejected() {
        let err = base().subject("hi\r\nBcc: victim@example.com").build().unwrap_err();
        assert!(matches!(err, Error::InvalidHeader { .. }));
    }

    #[test]
    fn test_generated_message_id_uses_sender_domain() {
        let rendered = MessageBuilder::new()
            .from("sender@mail.example.org")
            .to("r@example.com")
            .build()
            .unwrap();
        let line = rendered
            .lines()
            .find(|l| l.starts_with("Message-ID: "))
            .unwrap();
        assert!(line.ends_with("@mail.example.org>"));
    }

    #[test]
    fn test_extra_header() {
        let rendered = base().header("Reply-To", "help@example.com").build().unwrap();
        assert!(rendered.contains("Reply-To: help@example.com\r\n"));
    }
}
