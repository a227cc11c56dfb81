// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Server Registrar
//!
//! Network-layer seam: hands out listen endpoints for workers, announces
//! them to whatever routes players to them, and probes them for readiness.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Endpoint reservation, announcement and readiness probing

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistrarError {
    #[error("Unable to find an unused port")]
    PortNotFound,

    #[error("Server already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Server not registered: {0}")]
    NotRegistered(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Endpoint {
    pub ip: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

#[async_trait]
pub trait ServerRegistrar: Send + Sync {
    /// Reserves an endpoint for a worker about to start.
    fn reserve_endpoint(&self) -> Result<Endpoint, RegistrarError>;

    /// Returns a reserved endpoint to the pool.
    fn release(&self, endpoint: &Endpoint);

    /// Makes a worker reachable under `name`.
    fn announce(&self, name: &str, endpoint: &Endpoint) -> Result<(), RegistrarError>;

    /// Removes a worker announced under `name`. Unknown names are ignored.
    fn withdraw(&self, name: &str);

    /// True once the worker accepts connections.
    async fn probe(&self, name: &str, endpoint: &Endpoint) -> bool;
}
