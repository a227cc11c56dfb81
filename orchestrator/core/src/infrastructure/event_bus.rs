// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Server Events
//
// Provides in-memory event streaming using tokio broadcast channels.
// Worker console lines and lifecycle status changes are published here and
// streamed to the CLI and other observers. Events are not persisted.

use crate::domain::events::ServerEvent;
use crate::domain::server::{OutputSink, ServerStatus};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Event bus for publishing and subscribing to server events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<ServerEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish a server event to all subscribers
    pub fn publish(&self, event: ServerEvent) {
        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to server events");
        }
    }

    /// Subscribe to all server events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
            server: None,
        }
    }

    /// Subscribe to the events of a single server
    pub fn subscribe_server(&self, server: impl Into<String>) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
            server: Some(server.into()),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl OutputSink for EventBus {
    fn handle_output(&self, server: &str, line: &str) {
        debug!(target: "myserver::console", server = %server, "{}", line);
        self.publish(ServerEvent::ConsoleOutput {
            server: server.to_string(),
            line: line.to_string(),
            emitted_at: Utc::now(),
        });
    }

    fn status_changed(&self, server: &str, uuid: Uuid, status: ServerStatus) {
        info!(server = %server, %uuid, "Server status changed to {}", status);
        self.publish(ServerEvent::StatusChanged {
            server: server.to_string(),
            uuid,
            status,
            changed_at: Utc::now(),
        });
    }
}

/// Receiver for server events, optionally filtered to one server
pub struct EventReceiver {
    receiver: broadcast::Receiver<ServerEvent>,
    server: Option<String>,
}

impl EventReceiver {
    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<ServerEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Closed => EventBusError::Closed,
                broadcast::error::RecvError::Lagged(n) => {
                    warn!("Event receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;
            match &self.server {
                Some(server) if event.server() != server => continue,
                _ => return Ok(event),
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
