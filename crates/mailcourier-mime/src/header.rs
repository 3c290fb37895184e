//! Ordered header block.

use crate::error::{Error, Result};
use std::fmt;

/// Collection of email headers, rendered in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header value, keeping existing values with the same name.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Sets a header value, replacing any existing values.
    ///
    /// The header keeps the position of its first occurrence.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        let mut replaced = false;
        self.entries.retain_mut(|(existing, slot)| {
            if !existing.eq_ignore_ascii_case(&name) {
                return true;
            }
            if replaced {
                return false;
            }
            *slot = value.clone();
            replaced = true;
            true
        });
        if !replaced {
            self.entries.push((name, value));
        }
    }

    /// Gets the first value for a header (case-insensitive).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns true if the header is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns an iterator over all headers.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Rejects raw values that would terminate or inject header lines.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeader`] if the value contains CR or LF.
    pub fn check_value(name: &str, value: &str) -> Result<()> {
        if value.contains(['\r', '\n']) {
            return Err(Error::InvalidHeader {
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}
