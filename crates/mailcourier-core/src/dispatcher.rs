//! Host-facing facade.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::DispatchConfig;
use crate::engine::{DeliveryEngine, Dispatch};
use crate::limit::RateLimiter;
use crate::message::Message;
use crate::record::{EmailId, EmailRepository};
use crate::transport::SmtpTransport;
use crate::worker::Worker;
use crate::{Error, Result};

struct RunningWorker {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Sends and schedules mail, and runs at most one background worker.
pub struct Dispatcher {
    engine: DeliveryEngine,
    interval: Duration,
    worker: Mutex<Option<RunningWorker>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("engine", &self.engine)
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Dispatcher {
    /// Creates a dispatcher around an engine.
    #[must_use]
    pub fn new(engine: DeliveryEngine, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            worker: Mutex::new(None),
        }
    }

    /// Opens the database and SMTP transport described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the database cannot be opened.
    pub async fn connect(config: &DispatchConfig) -> Result<Self> {
        config.validate()?;

        let path = config.database_path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let path = path.to_str().ok_or_else(|| {
            Error::Config(format!("database path is not UTF-8: {}", path.display()))
        })?;

        let mut repository = EmailRepository::new(path).await?;
        if !config.attachments {
            repository = repository.without_attachments();
        }
        let limiter = RateLimiter::new(repository.clone(), config.limits());
        let transport = Arc::new(SmtpTransport::new(config.smtp.clone()));

        tracing::info!(
            database = %path,
            smtp = %config.smtp.host,
            limits = ?config.limits(),
            "dispatcher ready"
        );
        Ok(Self::new(
            DeliveryEngine::new(repository, limiter, transport),
            config.cycle(),
        ))
    }

    /// Returns the engine.
    #[must_use]
    pub const fn engine(&self) -> &DeliveryEngine {
        &self.engine
    }

    /// Stores the message and delivers it now. See [`DeliveryEngine::send`].
    ///
    /// # Errors
    ///
    /// Returns an error only if storing the records fails.
    pub async fn send(&self, message: &Message) -> Result<Vec<Dispatch>> {
        self.engine.send(message).await
    }

    /// Stores the message for the worker. See [`DeliveryEngine::schedule`].
    ///
    /// # Errors
    ///
    /// Returns an error if storing fails.
    pub async fn schedule(
        &self,
        message: &Message,
        at: Option<DateTime<Utc>>,
    ) -> Result<Vec<EmailId>> {
        self.engine.schedule(message, at).await
    }

    /// Starts the background worker. Returns false, doing nothing, if one is
    /// already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_worker(&self) -> bool {
        let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|w| !w.task.is_finished()) {
            tracing::warn!("mail worker already running");
            return false;
        }

        let (stop, receiver) = watch::channel(false);
        let worker = Worker::new(self.engine.clone(), self.interval);
        let task = tokio::spawn(worker.run(receiver));
        *slot = Some(RunningWorker { stop, task });
        true
    }

    /// Signals the worker to stop and waits for it to finish its current cycle.
    pub async fn stop_worker(&self) {
        let running = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(running) = running else {
            tracing::debug!("mail worker not running");
            return;
        };

        // The worker may already be gone; then there is nobody to notify.
        let _ = running.stop.send(true);
        if let Err(e) = running.task.await {
            tracing::error!(error = %e, "mail worker ended abnormally");
        }
    }

    /// Returns true while the worker task is alive.
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|w| !w.task.is_finished())
    }
}
