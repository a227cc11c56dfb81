// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Server Instances
//!
//! Domain types for worker server instances: lifecycle status and its
//! transition rules, the persisted instance manifest, display snapshots and
//! the output capability.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Instance state machine, persistence format and errors
//!
//! # Lifecycle
//!
//! ```text
//! STOPPED/ERROR --start--> INIT --> STARTING --probe ok--> STARTED
//! STARTED --stop--> STOPPING --process exit--> STOPPED
//! INIT/STARTING --failure--> ERROR
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::artifact::BuildError;
use crate::domain::registrar::{Endpoint, RegistrarError};
use crate::domain::template::{scalar_string, TemplateError};

/// File name of the persisted instance manifest.
pub const INSTANCE_MANIFEST: &str = "instance.yml";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("No such server: {0}")]
    NoSuchServer(String),

    #[error("Invalid server: {0}")]
    InvalidServer(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Failed to render: {0}")]
    Render(String),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Registrar(#[from] RegistrarError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerStatus {
    Unknown,
    Stopped,
    Init,
    Starting,
    Started,
    Stopping,
    Error,
}

impl ServerStatus {
    /// Start is accepted from STOPPED and ERROR.
    pub fn check_startable(self) -> Result<(), ServerError> {
        let reason = match self {
            ServerStatus::Stopped | ServerStatus::Error => return Ok(()),
            ServerStatus::Started => "Server is already started",
            ServerStatus::Init | ServerStatus::Starting => "Server is already starting",
            ServerStatus::Stopping => "Server is still stopping",
            ServerStatus::Unknown => "Server is not in a state to be started",
        };
        Err(ServerError::InvalidState(reason.to_string()))
    }

    /// Stop is accepted from STARTED only.
    pub fn check_stoppable(self) -> Result<(), ServerError> {
        let reason = match self {
            ServerStatus::Started => return Ok(()),
            ServerStatus::Stopped => "Server is already stopped",
            ServerStatus::Stopping => "Server is already stopping",
            ServerStatus::Init | ServerStatus::Starting => "Server is still starting",
            ServerStatus::Error | ServerStatus::Unknown => "Server is not in a state to be stopped",
        };
        Err(ServerError::InvalidState(reason.to_string()))
    }

    /// True while a start is in progress or a process may be alive.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ServerStatus::Init | ServerStatus::Starting | ServerStatus::Started | ServerStatus::Stopping
        )
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ServerStatus::Unknown => "UNKNOWN",
            ServerStatus::Stopped => "STOPPED",
            ServerStatus::Init => "INIT",
            ServerStatus::Starting => "STARTING",
            ServerStatus::Started => "STARTED",
            ServerStatus::Stopping => "STOPPING",
            ServerStatus::Error => "ERROR",
        };
        f.write_str(label)
    }
}

// ============================================================================
// Persistence
// ============================================================================

/// On-disk form of an instance (`instance.yml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Full name of the template the instance was created from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Subject to granted permission nodes.
    #[serde(default)]
    pub permissions: BTreeMap<String, Vec<String>>,

    /// Tag overrides.
    #[serde(default, deserialize_with = "scalar_map")]
    pub tags: BTreeMap<String, String>,
}

impl ServerManifest {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ServerError> {
        serde_yaml::from_str(yaml).map_err(|e| ServerError::InvalidServer(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String, ServerError> {
        serde_yaml::to_string(self).map_err(|e| ServerError::InvalidServer(e.to_string()))
    }

    pub fn require_uuid(&self) -> Result<Uuid, ServerError> {
        self.uuid
            .ok_or_else(|| ServerError::InvalidServer("Missing uuid field".to_string()))
    }

    pub fn require_name(&self) -> Result<&str, ServerError> {
        self.name
            .as_deref()
            .ok_or_else(|| ServerError::InvalidServer("Missing name field".to_string()))
    }

    pub fn require_template(&self) -> Result<&str, ServerError> {
        self.template
            .as_deref()
            .ok_or_else(|| ServerError::InvalidServer("Missing template field".to_string()))
    }
}

fn scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, serde_yaml::Value>> = Option::deserialize(deserializer)?;
    raw.unwrap_or_default()
        .into_iter()
        .map(|(key, value)| {
            scalar_string(&value)
                .map(|v| (key.clone(), v))
                .ok_or_else(|| serde::de::Error::custom(format!("tag {} must be a scalar", key)))
        })
        .collect()
}

/// Point-in-time view of an instance for display.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub uuid: Uuid,
    pub name: String,
    pub template: String,
    pub status: ServerStatus,
    pub endpoint: Option<Endpoint>,
    pub path: PathBuf,
    pub tags: BTreeMap<String, String>,
    pub permissions: BTreeMap<String, Vec<String>>,
}

/// Receives worker console output, one line at a time, and lifecycle
/// status changes.
pub trait OutputSink: Send + Sync {
    fn handle_output(&self, server: &str, line: &str);

    fn status_changed(&self, _server: &str, _uuid: Uuid, _status: ServerStatus) {}
}
