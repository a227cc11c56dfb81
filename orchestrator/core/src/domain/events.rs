// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Server Events
//
// Events emitted while supervising worker servers: console lines and
// lifecycle status changes. Published through the event bus to the CLI and
// any other observer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::server::ServerStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    ConsoleOutput {
        server: String,
        line: String,
        emitted_at: DateTime<Utc>,
    },
    StatusChanged {
        server: String,
        uuid: Uuid,
        status: ServerStatus,
        changed_at: DateTime<Utc>,
    },
}

impl ServerEvent {
    pub fn server(&self) -> &str {
        match self {
            ServerEvent::ConsoleOutput { server, .. } => server,
            ServerEvent::StatusChanged { server, .. } => server,
        }
    }
}
