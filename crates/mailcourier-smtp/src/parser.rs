//! SMTP reply parser.
//!
//! Replies arrive one line at a time. Continuation lines use `-` after the
//! code (`250-SIZE 1000`), the final line uses a space or nothing (`250 OK`,
//! `250`). [`ReplyParser`] accumulates lines until a reply is complete.

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// Incremental parser for one reply.
#[derive(Debug, Default)]
pub struct ReplyParser {
    code: Option<ReplyCode>,
    lines: Vec<String>,
}

impl ReplyParser {
    /// Creates an empty parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one line (without CRLF).
    ///
    /// Returns the reply once its final line has been fed; the parser is then
    /// empty again and can be reused.
    ///
    /// # Errors
    ///
    /// Returns `Error::Protocol` if the line has no valid code, an unknown
    /// separator, or a code that differs from earlier lines of the reply.
    pub fn feed(&mut self, line: &str) -> Result<Option<Reply>> {
        let (code, last, text) = split_line(line)?;

        match self.code {
            Some(expected) if expected != code => {
                return Err(Error::Protocol(format!(
                    "reply code changed from {expected} to {code} mid-reply"
                )));
            }
            Some(_) => {}
            None => self.code = Some(code),
        }
        self.lines.push(text.to_string());

        if !last {
            return Ok(None);
        }

        self.code = None;
        Ok(Some(Reply::new(code, std::mem::take(&mut self.lines))))
    }
}

fn split_line(line: &str) -> Result<(ReplyCode, bool, &str)> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(Error::Protocol(format!("malformed reply line: {line:?}")));
    }

    let code = line[..3]
        .parse::<u16>()
        .map_err(|_| Error::Protocol(format!("invalid reply code: {line:?}")))?;

    match bytes.get(3) {
        None => Ok((ReplyCode::new(code), true, "")),
        Some(b' ') => Ok((ReplyCode::new(code), true, &line[4..])),
        Some(b'-') => Ok((ReplyCode::new(code), false, &line[4..])),
        Some(_) => Err(Error::Protocol(format!("malformed reply line: {line:?}"))),
    }
}
