//! Rate limiting.
//!
//! Limits are checked against what the store says was sent, at the moment of
//! the check. Nothing is reserved, so two concurrent senders can both pass a
//! check and overshoot a window by one; the limiter is best-effort throttling.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::record::EmailRepository;

/// A sliding rate-limit window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    /// The last 60 seconds.
    Minute,
    /// The last 3600 seconds.
    Hour,
    /// The last 86400 seconds.
    Day,
}

impl Window {
    /// Windows in the order they are checked.
    pub const ALL: [Self; 3] = [Self::Minute, Self::Hour, Self::Day];

    /// Returns the window length.
    #[must_use]
    pub fn duration(self) -> Duration {
        match self {
            Self::Minute => Duration::minutes(1),
            Self::Hour => Duration::hours(1),
            Self::Day => Duration::days(1),
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
        })
    }
}

/// Maximum deliveries per window; `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    /// Per-minute limit.
    pub per_minute: Option<u32>,
    /// Per-hour limit.
    pub per_hour: Option<u32>,
    /// Per-day limit.
    pub per_day: Option<u32>,
}

impl RateLimits {
    /// No limits at all.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            per_minute: None,
            per_hour: None,
            per_day: None,
        }
    }

    /// Returns the limit for a window.
    #[must_use]
    pub const fn get(&self, window: Window) -> Option<u32> {
        match window {
            Window::Minute => self.per_minute,
            Window::Hour => self.per_hour,
            Window::Day => self.per_day,
        }
    }

    /// Returns true if no window is limited.
    #[must_use]
    pub const fn is_unlimited(&self) -> bool {
        self.per_minute.is_none() && self.per_hour.is_none() && self.per_day.is_none()
    }
}

/// A window already holds as many deliveries as its limit allows.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Rate limit exceeded: {count} sent in the last {window} (limit {limit})")]
pub struct RateLimitExceeded {
    /// The first full window.
    pub window: Window,
    /// Its limit.
    pub limit: u32,
    /// Deliveries counted in it.
    pub count: u64,
}

/// Admission control in front of the transport.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    repository: EmailRepository,
    limits: RateLimits,
}

impl RateLimiter {
    /// Creates a limiter that counts deliveries in `repository`.
    #[must_use]
    pub const fn new(repository: EmailRepository, limits: RateLimits) -> Self {
        Self { repository, limits }
    }

    /// Returns the configured limits.
    #[must_use]
    pub const fn limits(&self) -> RateLimits {
        self.limits
    }

    /// Checks whether one more delivery is allowed now.
    ///
    /// # Errors
    ///
    /// Returns `Error::RateLimited` for the first full window (minute, hour,
    /// then day), or a database error.
    pub async fn check_limit(&self) -> Result<()> {
        self.check_limit_at(Utc::now()).await
    }

    /// Checks whether one more delivery is allowed at `now`.
    ///
    /// # Errors
    ///
    /// Same as [`check_limit`](Self::check_limit).
    pub async fn check_limit_at(&self, now: DateTime<Utc>) -> Result<()> {
        for window in Window::ALL {
            let Some(limit) = self.limits.get(window) else {
                continue;
            };

            let count = self
                .repository
                .count_sent_since(now - window.duration())
                .await?;
            if count >= u64::from(limit) {
                tracing::debug!(%window, limit, count, "rate limit reached");
                return Err(RateLimitExceeded {
                    window,
                    limit,
                    count,
                }
                .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{Error, Message};
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, hour, minute, second).unwrap()
    }

    /// Stores `times.len()` records and marks them sent at the given times.
    async fn repo_with_sent(times: &[DateTime<Utc>]) -> EmailRepository {
        let repo = EmailRepository::in_memory().await.unwrap();
        let mut message = Message::new("s@x.com", "x");
        for i in 0..times.len() {
            message = message.to(format!("r{i}@x.com"));
        }
        let ids = repo.insert_all(&message, at(0, 0, 0)).await.unwrap();
        for (id, sent_at) in ids.iter().zip(times) {
            repo.mark_sent(*id, *sent_at, None).await.unwrap();
        }
        repo
    }

    fn exceeded(result: Result<()>) -> RateLimitExceeded {
        match result {
            Err(Error::RateLimited(e)) => e,
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unlimited_never_blocks() {
        let repo = repo_with_sent(&[at(12, 0, 0); 5]).await;
        let limiter = RateLimiter::new(repo, RateLimits::unlimited());
        limiter.check_limit_at(at(12, 0, 1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_minute_window() {
        let repo = repo_with_sent(&[at(12, 0, 0)]).await;
        let limiter = RateLimiter::new(
            repo,
            RateLimits {
                per_minute: Some(1),
                ..RateLimits::default()
            },
        );

        let err = exceeded(limiter.check_limit_at(at(12, 0, 30)).await);
        assert_eq!(
            err,
            RateLimitExceeded {
                window: Window::Minute,
                limit: 1,
                count: 1
            }
        );
        // Exactly one window later the send falls out of the window.
        limiter.check_limit_at(at(12, 1, 0)).await.unwrap();
    }

    #[tokio::test]
    async fn test_first_full_window_is_reported() {
        let repo = repo_with_sent(&[at(11, 10, 0), at(11, 20, 0), at(11, 59, 50)]).await;
        let limiter = RateLimiter::new(
            repo,
            RateLimits {
                per_minute: Some(5),
                per_hour: Some(3),
                per_day: Some(2),
            },
        );

        let err = exceeded(limiter.check_limit_at(at(12, 0, 0)).await);
        assert_eq!(err.window, Window::Hour);
        assert_eq!(err.count, 3);
    }

    #[tokio::test]
    async fn test_day_window() {
        let repo = repo_with_sent(&[at(1, 0, 0), at(2, 0, 0)]).await;
        let limiter = RateLimiter::new(
            repo,
            RateLimits {
                per_day: Some(2),
                ..RateLimits::default()
            },
        );
        assert_eq!(exceeded(limiter.check_limit_at(at(23, 0, 0)).await).window, Window::Day);
    }

    #[tokio::test]
    async fn test_zero_limit_blocks_everything() {
        let repo = repo_with_sent(&[]).await;
        let limiter = RateLimiter::new(
            repo,
            RateLimits {
                per_hour: Some(0),
                ..RateLimits::default()
            },
        );
        let err = exceeded(limiter.check_limit_at(at(12, 0, 0)).await);
        assert_eq!(err.count, 0);
        assert_eq!(err.to_string(), "Rate limit exceeded: 0 sent in the last hour (limit 0)");
    }

    #[tokio::test]
    async fn test_pending_records_do_not_count() {
        let repo = EmailRepository::in_memory().await.unwrap();
        repo.insert_all(&Message::new("s@x.com", "x").to("a@x.com"), at(12, 0, 0))
            .await
            .unwrap();
        let limiter = RateLimiter::new(
            repo,
            RateLimits {
                per_minute: Some(1),
                ..RateLimits::default()
            },
        );
        limiter.check_limit_at(at(12, 0, 1)).await.unwrap();
    }
}
