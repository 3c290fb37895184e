//! The delivery engine.
//!
//! Owns the per-record send path: admission through the rate limiter, one
//! transport attempt, and recording the outcome. A record is written to only
//! when the outcome is final (accepted or refused); any other failure leaves
//! it untouched and pending.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::limit::RateLimiter;
use crate::message::Message;
use crate::record::{EmailId, EmailRecord, EmailRepository};
use crate::transport::{Transport, TransportConnection, TransportError};
use crate::{Error, Result};

/// Final outcome of a delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// The server accepted the message.
    Delivered,
    /// The message was refused for good; the reason is stored on the record.
    Rejected(String),
}

/// Result of sending one fanned-out record.
#[derive(Debug)]
pub struct Dispatch {
    /// The stored record.
    pub email_id: EmailId,
    /// Its recipient.
    pub recipient: String,
    /// What happened. An `Err` means the record is still pending.
    pub result: Result<DeliveryStatus>,
}

/// Fan-out, scheduling and delivery over a store, a limiter and a transport.
#[derive(Clone)]
pub struct DeliveryEngine {
    repository: EmailRepository,
    limiter: RateLimiter,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for DeliveryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryEngine")
            .field("repository", &self.repository)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl DeliveryEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(
        repository: EmailRepository,
        limiter: RateLimiter,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            repository,
            limiter,
            transport,
        }
    }

    /// Returns the record store.
    #[must_use]
    pub const fn repository(&self) -> &EmailRepository {
        &self.repository
    }

    /// Returns the rate limiter.
    #[must_use]
    pub const fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Stores one record per recipient and tries to deliver each right away.
    ///
    /// Each record is committed before its attempt and gets its own
    /// connection. A failed or throttled record does not stop the others; its
    /// `Dispatch` carries the error and the record stays pending for the
    /// worker.
    ///
    /// # Errors
    ///
    /// Returns an error only if storing the records fails.
    pub async fn send(&self, message: &Message) -> Result<Vec<Dispatch>> {
        let records = self.repository.insert_each(message, Utc::now()).await?;
        tracing::debug!(
            subject = %message.subject,
            records = records.len(),
            "message stored for immediate delivery"
        );

        let mut dispatches = Vec::with_capacity(records.len());
        for record in records {
            let result = self.deliver(&record, None).await;
            if let Err(e) = &result {
                tracing::warn!(
                    email_id = %record.id,
                    error = %e,
                    "immediate delivery failed, left pending"
                );
            }
            dispatches.push(Dispatch {
                email_id: record.id,
                recipient: record.recipient,
                result,
            });
        }
        Ok(dispatches)
    }

    /// Stores one record per recipient for the worker to send at `at`
    /// (now if `None`). Nothing is sent.
    ///
    /// # Errors
    ///
    /// Returns an error if storing fails; no record is stored then.
    pub async fn schedule(
        &self,
        message: &Message,
        at: Option<DateTime<Utc>>,
    ) -> Result<Vec<EmailId>> {
        let at = at.unwrap_or_else(Utc::now);
        let ids = self.repository.insert_all(message, at).await?;
        tracing::info!(
            subject = %message.subject,
            records = ids.len(),
            scheduled_at = %at,
            "message scheduled"
        );
        Ok(ids)
    }

    /// Attempts one record.
    ///
    /// Uses `connection` when given, otherwise opens a connection for this
    /// record alone and closes it afterwards. Acceptance and refusal are
    /// written to the record; a refusal is not an error.
    ///
    /// # Errors
    ///
    /// - `Error::RateLimited` if a window is full; nothing was sent.
    /// - `Error::Transport` for connection-level failures; nothing was written.
    /// - `Error::Database` if the outcome could not be written.
    pub async fn deliver(
        &self,
        record: &EmailRecord,
        connection: Option<&mut (dyn TransportConnection + '_)>,
    ) -> Result<DeliveryStatus> {
        self.limiter.check_limit().await?;

        let message = record.message();
        let outcome = match connection {
            Some(connection) => connection.send(&message).await,
            None => self.send_once(&message).await,
        };

        let (status, error) = match outcome {
            Ok(()) => (DeliveryStatus::Delivered, None),
            Err(e) if e.is_rejection() => {
                let reason = e.to_string();
                (DeliveryStatus::Rejected(reason.clone()), Some(reason))
            }
            Err(e) => return Err(Error::Transport(e)),
        };

        if !self
            .repository
            .mark_sent(record.id, Utc::now(), error.as_deref())
            .await?
        {
            tracing::warn!(email_id = %record.id, "record was already marked by another sender");
        }

        match &status {
            DeliveryStatus::Delivered => {
                tracing::info!(
                    email_id = %record.id,
                    recipient = %record.recipient,
                    "email delivered"
                );
            }
            DeliveryStatus::Rejected(reason) => {
                tracing::warn!(
                    email_id = %record.id,
                    recipient = %record.recipient,
                    reason = %reason,
                    "email rejected"
                );
            }
        }
        Ok(status)
    }

    async fn send_once(&self, message: &Message) -> std::result::Result<(), TransportError> {
        let mut connection = self.transport.connect().await?;
        let result = connection.send(message).await;
        if let Err(e) = connection.close().await {
            tracing::debug!(error = %e, "closing connection failed");
        }
        result
    }

    /// Opens a connection for a batch of deliveries.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the connection cannot be opened.
    pub async fn connect(
        &self,
    ) -> std::result::Result<Box<dyn TransportConnection>, TransportError> {
        self.transport.connect().await
    }

    /// Get a record by id.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if there is no such record, or a database error.
    pub async fn get(&self, id: EmailId) -> Result<EmailRecord> {
        self.repository.get(id).await?.ok_or(Error::NotFound(id))
    }

    /// All pending records, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn unsent(&self) -> Result<Vec<EmailRecord>> {
        self.repository.unsent().await
    }

    /// Pending records whose scheduled time has come, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn scheduled(&self) -> Result<Vec<EmailRecord>> {
        self.repository.due(Utc::now()).await
    }
}
