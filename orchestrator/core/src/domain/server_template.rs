// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Server Templates
//!
//! The server-specific part of a resolved template: how to launch the
//! worker, which console commands to send around start and stop, and the
//! artifact the worker runs.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::artifact::ArtifactProvider;
use crate::domain::template::{TemplateChain, TemplateError};

const DEFAULT_STOP_WAIT_SECS: u64 = 30;

/// Launch and shutdown settings, each resolved from the nearest template
/// in the lineage that defines it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Start command line; rendered with the instance's variables. Partial
    /// templates meant only as parents may leave it out.
    pub execute: Option<String>,
    pub start_commands: Vec<String>,
    pub start_delay: Duration,
    pub stop_commands: Vec<String>,
    /// Grace period between the stop commands and the forced kill.
    pub stop_wait: Duration,
}

impl ServerSettings {
    pub fn from_chain(chain: &TemplateChain<'_>) -> Result<Self, TemplateError> {
        Ok(Self {
            execute: chain.first_string(&["server", "execute"]),
            start_commands: chain.first_strings(&["server", "start", "commands"])?,
            start_delay: Duration::from_secs(
                chain.first_u64(&["server", "start", "delay"])?.unwrap_or(0),
            ),
            stop_commands: chain.first_strings(&["server", "stop", "commands"])?,
            stop_wait: Duration::from_secs(
                chain
                    .first_u64(&["server", "stop", "wait"])?
                    .unwrap_or(DEFAULT_STOP_WAIT_SECS),
            ),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerTemplate {
    settings: ServerSettings,
    artifact: Option<Arc<dyn ArtifactProvider>>,
}

impl ServerTemplate {
    pub fn new(settings: ServerSettings, artifact: Option<Arc<dyn ArtifactProvider>>) -> Self {
        Self { settings, artifact }
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Artifact installed before every start, if the type provides one.
    pub fn artifact(&self) -> Option<&Arc<dyn ArtifactProvider>> {
        self.artifact.as_ref()
    }
}
