//! The background worker.
//!
//! Every cycle drains the records whose scheduled time has come over a single
//! transport connection, then sleeps for the cycle interval. A stop request is
//! honored between cycles: a running batch always finishes, but the sleep is
//! cut short.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use crate::Error;
use crate::engine::{DeliveryEngine, DeliveryStatus};

/// What one cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Records attempted (including the one that hit the rate limit).
    pub processed: usize,
    /// Records accepted by the server.
    pub delivered: usize,
    /// Records refused for good.
    pub rejected: usize,
    /// Records that failed and stay pending.
    pub failed: usize,
    /// Whether the cycle ended early on a rate limit.
    pub throttled: bool,
}

/// Drains due records on an interval.
#[derive(Debug, Clone)]
pub struct Worker {
    engine: DeliveryEngine,
    interval: Duration,
}

impl Worker {
    /// Creates a worker that waits `interval` between cycles.
    #[must_use]
    pub const fn new(engine: DeliveryEngine, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Returns the wait between cycles.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs cycles until `stop` turns true or its sender is dropped.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        tracing::info!(interval = ?self.interval, "mail worker started");

        loop {
            if *stop.borrow() {
                break;
            }

            let report = self.run_cycle().await;
            if report.processed > 0 {
                tracing::info!(
                    processed = report.processed,
                    delivered = report.delivered,
                    rejected = report.rejected,
                    failed = report.failed,
                    throttled = report.throttled,
                    "mail cycle finished"
                );
            }

            tokio::select! {
                () = tokio::time::sleep(self.interval) => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("mail worker stopped");
    }

    /// Runs one cycle: every due record, in id order, over one connection.
    ///
    /// A rate limit ends the cycle; other per-record failures are logged and
    /// the record is skipped. If the due records cannot be read or the
    /// connection cannot be opened, the cycle does nothing.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        let due = match self.engine.repository().due(Utc::now()).await {
            Ok(due) => due,
            Err(e) => {
                tracing::error!(error = %e, "could not load scheduled mail");
                return report;
            }
        };
        if due.is_empty() {
            tracing::debug!("no scheduled mail due");
            return report;
        }

        let mut connection = match self.engine.connect().await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    pending = due.len(),
                    "mail server unreachable, skipping cycle"
                );
                return report;
            }
        };

        for record in &due {
            report.processed += 1;
            match self.engine.deliver(record, Some(&mut *connection)).await {
                Ok(DeliveryStatus::Delivered) => report.delivered += 1,
                Ok(DeliveryStatus::Rejected(_)) => report.rejected += 1,
                Err(Error::RateLimited(limit)) => {
                    tracing::warn!(
                        email_id = %record.id,
                        window = %limit.window,
                        limit = limit.limit,
                        "rate limit reached, deferring remaining mail"
                    );
                    report.throttled = true;
                    break;
                }
                Err(e) => {
                    tracing::error!(
                        email_id = %record.id,
                        error = %e,
                        "delivery failed, will retry"
                    );
                    report.failed += 1;
                }
            }
        }

        if let Err(e) = connection.close().await {
            tracing::debug!(error = %e, "closing connection failed");
        }
        report
    }
}
