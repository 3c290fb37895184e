//! In-process transport with scripted outcomes.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use mailcourier_core::{
    DeliveryEngine, EmailRepository, Message, RateLimiter, RateLimits, RejectStage, Transport,
    TransportConnection, TransportError,
};

/// How the fake server treats a recipient.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Refuse,
    Drop,
}

#[derive(Debug, Default)]
pub struct State {
    pub delivered: Vec<Message>,
    pub connects: usize,
    pub closes: usize,
    pub unreachable: bool,
    pub outcomes: HashMap<String, Outcome>,
    pub hold: Option<(Arc<Notify>, Arc<Notify>)>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    pub state: Arc<Mutex<State>>,
}

impl FakeTransport {
    pub fn refuse(&self, recipient: &str) {
        self.state
            .lock()
            .unwrap()
            .outcomes
            .insert(recipient.to_string(), Outcome::Refuse);
    }

    pub fn drop_connection_for(&self, recipient: &str) {
        self.state
            .lock()
            .unwrap()
            .outcomes
            .insert(recipient.to_string(), Outcome::Drop);
    }

    /// Parks the next send until the returned release is notified. The first
    /// notify fires once that send is parked.
    pub fn hold_next_send(&self) -> (Arc<Notify>, Arc<Notify>) {
        let parked = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        self.state.lock().unwrap().hold = Some((Arc::clone(&parked), Arc::clone(&release)));
        (parked, release)
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unwrap().unreachable = unreachable;
    }

    pub fn delivered_to(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .delivered
            .iter()
            .flat_map(|m| m.recipients.clone())
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self) -> Result<Box<dyn TransportConnection>, TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.unreachable {
            return Err(TransportError::Other("connection refused".into()));
        }
        state.connects += 1;
        Ok(Box::new(FakeConnection {
            state: Arc::clone(&self.state),
            open: true,
        }))
    }
}

struct FakeConnection {
    state: Arc<Mutex<State>>,
    open: bool,
}

#[async_trait]
impl TransportConnection for FakeConnection {
    async fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        let hold = self.state.lock().unwrap().hold.take();
        if let Some((parked, release)) = hold {
            parked.notify_one();
            release.notified().await;
        }
        let mut state = self.state.lock().unwrap();
        for recipient in &message.recipients {
            match state.outcomes.get(recipient) {
                Some(Outcome::Refuse) => {
                    return Err(TransportError::Rejected {
                        stage: RejectStage::Recipients,
                        code: 550,
                        message: format!("5.1.1 <{recipient}>: no such user"),
                    });
                }
                Some(Outcome::Drop) => {
                    return Err(TransportError::Other("connection reset".into()));
                }
                None => {}
            }
        }
        state.delivered.push(message.clone());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.open = false;
        self.state.lock().unwrap().closes += 1;
        Ok(())
    }
}

pub async fn engine_with(limits: RateLimits) -> (DeliveryEngine, FakeTransport) {
    let repository = EmailRepository::in_memory().await.unwrap();
    let transport = FakeTransport::default();
    let engine = DeliveryEngine::new(
        repository.clone(),
        RateLimiter::new(repository, limits),
        Arc::new(transport.clone()),
    );
    (engine, transport)
}

pub async fn engine() -> (DeliveryEngine, FakeTransport) {
    engine_with(RateLimits::unlimited()).await
}
