// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
// Event Bus Implementation - Pub/Sub for Engine Events
//
// In-memory fan-out using tokio broadcast channels. Lifecycle and container
// state changes reach every subscriber (CLI stream, UI bridge, tests).
// Events are not persisted; a slow subscriber loses the oldest ones.

use crate::domain::events::EngineEvent;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct EngineEventBus {
    sender: Arc<broadcast::Sender<EngineEvent>>,
}

impl EngineEventBus {
    /// Capacity is how many events are buffered before the oldest are dropped.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(256)
    }

    pub fn publish(&self, event: EngineEvent) {
        debug!(?event, "Publishing engine event");
        if self.sender.send(event).is_err() {
            debug!("No subscribers listening to engine events");
        }
    }

    pub fn subscribe(&self) -> EngineEventReceiver {
        EngineEventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EngineEventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

pub struct EngineEventReceiver {
    receiver: broadcast::Receiver<EngineEvent>,
}

impl EngineEventReceiver {
    /// Next event, or `Closed` once every sender is gone.
    pub async fn recv(&mut self) -> Result<EngineEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Like `recv`, but skips over a lag instead of reporting it.
    pub async fn next(&mut self) -> Option<EngineEvent> {
        loop {
            match self.recv().await {
                Ok(event) => return Some(event),
                Err(EventBusError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Result<EngineEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Drain everything currently buffered, skipping lag markers.
    pub fn drain(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        loop {
            match self.try_recv() {
                Ok(event) => events.push(event),
                Err(EventBusError::Lagged(_)) => continue,
                Err(_) => return events,
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}
