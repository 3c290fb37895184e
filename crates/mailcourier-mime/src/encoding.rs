//! Transfer and header encodings used when rendering messages.
//!
//! Supports Base64 (RFC 2045 line-wrapped), Quoted-Printable and RFC 2047
//! encoded-words.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt::Write as _;

/// Maximum encoded line length for Quoted-Printable and Base64 bodies.
const MAX_LINE_LENGTH: usize = 76;

/// Raw bytes carried by a single RFC 2047 encoded-word.
///
/// 45 bytes encode to 60 Base64 characters, which keeps the whole
/// `=?utf-8?B?...?=` word under the 75 character limit.
const MAX_WORD_BYTES: usize = 45;

/// Encodes data as a single Base64 line.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Encodes data as Base64 wrapped at 76 characters with CRLF line breaks.
#[must_use]
pub fn encode_base64_lines(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut result = String::with_capacity(encoded.len() + encoded.len() / MAX_LINE_LENGTH * 2);

    let mut rest = encoded.as_str();
    while rest.len() > MAX_LINE_LENGTH {
        let (line, tail) = rest.split_at(MAX_LINE_LENGTH);
        result.push_str(line);
        result.push_str("\r\n");
        rest = tail;
    }
    result.push_str(rest);

    result
}

/// Encodes text using Quoted-Printable encoding (RFC 2045).
///
/// Line breaks in the input (`\n` or `\r\n`) become hard CRLF breaks;
/// long lines are split with soft breaks.
#[must_use]
pub fn encode_quoted_printable(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for (index, line) in text.split('\n').enumerate() {
        if index > 0 {
            result.push_str("\r\n");
        }
        let line = line.strip_suffix('\r').unwrap_or(line);
        encode_qp_line(line.as_bytes(), &mut result);
    }

    result
}

fn encode_qp_line(line: &[u8], result: &mut String) {
    let mut width = 0;

    for (index, &byte) in line.iter().enumerate() {
        let at_line_end = index + 1 == line.len();
        let literal = match byte {
            b'!'..=b'<' | b'>'..=b'~' => true,
            // Trailing whitespace would be stripped in transit
            b' ' | b'\t' => !at_line_end,
            _ => false,
        };

        let needed = if literal { 1 } else { 3 };
        if width + needed > MAX_LINE_LENGTH - 1 {
            result.push_str("=\r\n");
            width = 0;
        }

        if literal {
            result.push(char::from(byte));
        } else {
            let _ = write!(result, "={byte:02X}");
        }
        width += needed;
    }
}

/// Encodes a header value with RFC 2047 Base64 encoded-words if needed.
///
/// Plain printable ASCII is returned unchanged. Longer values are split into
/// several encoded-words joined by folding whitespace, never splitting a
/// UTF-8 character.
#[must_use]
pub fn encode_rfc2047(text: &str) -> String {
    if !needs_encoding(text) {
        return text.to_string();
    }

    let mut words = Vec::new();
    let mut chunk = String::new();
    for ch in text.chars() {
        if !chunk.is_empty() && chunk.len() + ch.len_utf8() > MAX_WORD_BYTES {
            words.push(encoded_word(&chunk));
            chunk.clear();
        }
        chunk.push(ch);
    }
    if !chunk.is_empty() {
        words.push(encoded_word(&chunk));
    }

    words.join("\r\n ")
}

fn needs_encoding(text: &str) -> bool {
    text.contains("=?") || text.chars().any(|c| !(c.is_ascii_graphic() || c == ' '))
}

fn encoded_word(chunk: &str) -> String {
    format!("=?utf-8?B?{}?=", encode_base64(chunk.as_bytes()))
}
