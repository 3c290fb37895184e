//! Dispatcher configuration.
//!
//! Loaded from a JSON file. The rate limits and the cycle interval can also be
//! given under their upper-case names (`MAIL_PER_MINUTE`, `MAIL_PER_HOUR`,
//! `MAIL_PER_DAY`, `MAIL_ALCHEMY_CYCLE`), both as JSON keys and as
//! environment variables; the environment wins.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::limit::RateLimits;
use crate::{Error, Result};

/// Environment variable for the per-minute limit.
pub const ENV_PER_MINUTE: &str = "MAIL_PER_MINUTE";
/// Environment variable for the per-hour limit.
pub const ENV_PER_HOUR: &str = "MAIL_PER_HOUR";
/// Environment variable for the per-day limit.
pub const ENV_PER_DAY: &str = "MAIL_PER_DAY";
/// Environment variable for the worker cycle in seconds.
pub const ENV_CYCLE: &str = "MAIL_ALCHEMY_CYCLE";

const APP_DIR: &str = "mailcourier";

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// No encryption (not recommended).
    None,
    /// Implicit TLS (connect directly with TLS).
    #[default]
    Tls,
    /// STARTTLS upgrade after plaintext connect.
    StartTls,
}

impl Security {
    /// Default port for the security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None => 25,
            Self::StartTls => 587,
            Self::Tls => 465,
        }
    }
}

/// SMTP server settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    /// Server hostname.
    pub host: String,
    /// Server port; defaults by security mode.
    pub port: Option<u16>,
    /// Security mode.
    pub security: Security,
    /// Username for authentication; no AUTH when absent.
    pub username: Option<String>,
    /// Password for authentication.
    pub password: Option<String>,
    /// Name sent in EHLO.
    pub hello_name: String,
    /// Bound on every network exchange, in seconds.
    pub timeout_secs: u64,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: None,
            security: Security::default(),
            username: None,
            password: None,
            hello_name: "localhost".into(),
            timeout_secs: 30,
        }
    }
}

impl SmtpSettings {
    /// Effective port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.security.default_port())
    }

    /// Effective network timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("security", &self.security)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("hello_name", &self.hello_name)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Everything a [`Dispatcher`](crate::Dispatcher) needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Per-minute delivery limit.
    #[serde(alias = "MAIL_PER_MINUTE")]
    pub per_minute: Option<u32>,
    /// Per-hour delivery limit.
    #[serde(alias = "MAIL_PER_HOUR")]
    pub per_hour: Option<u32>,
    /// Per-day delivery limit.
    #[serde(alias = "MAIL_PER_DAY")]
    pub per_day: Option<u32>,
    /// Seconds between worker cycles.
    #[serde(alias = "MAIL_ALCHEMY_CYCLE")]
    pub cycle_secs: u64,
    /// Whether attachments are stored and sent.
    pub attachments: bool,
    /// `SQLite` database file; defaults to the user data directory.
    pub database: Option<PathBuf>,
    /// SMTP server.
    pub smtp: SmtpSettings,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            per_minute: None,
            per_hour: None,
            per_day: None,
            cycle_secs: 10,
            attachments: true,
            database: None,
            smtp: SmtpSettings::default(),
        }
    }
}

impl DispatchConfig {
    /// Default config file: `<config dir>/mailcourier/config.json`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.json")
    }

    /// Reads a config file and applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or the result
    /// is invalid.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        let mut config = Self::from_json(&contents)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise starts from defaults; environment
    /// overrides apply either way.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub async fn load_or_default(path: &Path) -> Result<Self> {
        if tokio::fs::try_exists(path).await? {
            return Self::load(path).await;
        }
        let mut config = Self::default();
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parses JSON without applying the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not describe a config.
    pub fn from_json(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Applies overrides looked up by variable name. Empty values clear a limit.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a value is not a non-negative integer.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup(ENV_PER_MINUTE) {
            self.per_minute = parse_limit(ENV_PER_MINUTE, &value)?;
        }
        if let Some(value) = lookup(ENV_PER_HOUR) {
            self.per_hour = parse_limit(ENV_PER_HOUR, &value)?;
        }
        if let Some(value) = lookup(ENV_PER_DAY) {
            self.per_day = parse_limit(ENV_PER_DAY, &value)?;
        }
        if let Some(value) = lookup(ENV_CYCLE) {
            self.cycle_secs = value.trim().parse().map_err(|_| {
                Error::Config(format!("{ENV_CYCLE} must be a number of seconds, got {value:?}"))
            })?;
        }
        Ok(())
    }

    /// Checks values that would make the dispatcher misbehave.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first problem.
    pub fn validate(&self) -> Result<()> {
        if self.cycle_secs == 0 {
            return Err(Error::Config("cycle_secs must be at least 1".into()));
        }
        if self.smtp.host.trim().is_empty() {
            return Err(Error::Config("smtp.host must not be empty".into()));
        }
        if self.smtp.username.is_some() != self.smtp.password.is_some() {
            return Err(Error::Config(
                "smtp.username and smtp.password must be given together".into(),
            ));
        }
        Ok(())
    }

    /// The configured rate limits.
    #[must_use]
    pub const fn limits(&self) -> RateLimits {
        RateLimits {
            per_minute: self.per_minute,
            per_hour: self.per_hour,
            per_day: self.per_day,
        }
    }

    /// Time between worker cycles.
    #[must_use]
    pub const fn cycle(&self) -> Duration {
        Duration::from_secs(self.cycle_secs)
    }

    /// Database file: the configured one, or `<data dir>/mailcourier/mail.db`.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.database.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("mail.db")
        })
    }
}

fn parse_limit(name: &str, value: &str) -> Result<Option<u32>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value.parse().map(Some).map_err(|_| {
        Error::Config(format!("{name} must be a non-negative integer, got {value:?}"))
    })
}
