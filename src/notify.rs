//! Outbound seams: the Notification Bridge and the statistics recorder
//!
//! Both are fire-and-forget from the engine's point of view. Orchestrators
//! emit while still holding the lock of the object the event is about, so
//! events for one target leave in the order they were produced.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;

use crate::events::EngineEvent;
use crate::types::{DeployableId, PlayerId, StoreId};

/// Receives every event the engine produces
///
/// `emit` runs while the engine still holds the lock of the object the event
/// is about. Implementations must hand the event off and return; calling back
/// into the engine from `emit` deadlocks.
pub trait Notifier: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

pub type SharedNotifier = Arc<dyn Notifier>;

/// Notifier backed by an unbounded channel (one consumer task downstream)
#[derive(Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn emit(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            trace!("Notification bridge closed, dropping event");
        }
    }
}

/// Notifier that keeps everything in memory, for assertions
#[derive(Default)]
pub struct CapturingNotifier {
    events: Mutex<Vec<EngineEvent>>,
}

impl CapturingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<EngineEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn count(&self, pred: impl Fn(&EngineEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

impl Notifier for CapturingNotifier {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().push(event);
    }
}

/// Successful transaction worth keeping for player statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatRecord {
    Deploy {
        player: PlayerId,
        target: DeployableId,
        at: DateTime<Utc>,
    },
    Resupply {
        player: PlayerId,
        store: StoreId,
        amount: u32,
        at: DateTime<Utc>,
    },
}

/// Persistence collaborator; the engine never waits on it
pub trait StatsRecorder: Send + Sync {
    fn record(&self, record: StatRecord);
}

pub type SharedRecorder = Arc<dyn StatsRecorder>;

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl StatsRecorder for NoopRecorder {
    fn record(&self, _record: StatRecord) {}
}

/// Hands records to a background writer over a channel
#[derive(Clone)]
pub struct ChannelRecorder {
    tx: mpsc::UnboundedSender<StatRecord>,
}

impl ChannelRecorder {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatsRecorder for ChannelRecorder {
    fn record(&self, record: StatRecord) {
        let _ = self.tx.send(record);
    }
}
