// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Local Server Registrar
//!
//! [`ServerRegistrar`] for a single host: endpoints come from a configured
//! port range on the listen address, announcements are kept in memory, and
//! readiness is a plain TCP connect to the worker's port.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Port pool, announcement table and connect probe

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::net::TcpListener;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::domain::node_config::RegistrarConfig;
use crate::domain::registrar::{Endpoint, RegistrarError, ServerRegistrar};

pub struct LocalServerRegistrar {
    ip: String,
    port_start: u16,
    port_amount: u16,
    probe_timeout: Duration,
    reserved: Mutex<BTreeSet<u16>>,
    announced: DashMap<String, Endpoint>,
}

impl LocalServerRegistrar {
    pub fn new(config: &RegistrarConfig, probe_timeout: Duration) -> Self {
        Self {
            ip: config.ip_listen.clone(),
            port_start: config.port_start,
            port_amount: config.port_amount,
            probe_timeout,
            reserved: Mutex::new(BTreeSet::new()),
            announced: DashMap::new(),
        }
    }

    /// Endpoint a server is currently announced under.
    pub fn announced(&self, name: &str) -> Option<Endpoint> {
        self.announced.get(name).map(|e| e.value().clone())
    }

    fn port_is_free(&self, port: u16) -> bool {
        TcpListener::bind((self.ip.as_str(), port)).is_ok()
    }
}

#[async_trait]
impl ServerRegistrar for LocalServerRegistrar {
    fn reserve_endpoint(&self) -> Result<Endpoint, RegistrarError> {
        let mut reserved = self.reserved.lock();
        let end = u32::from(self.port_start) + u32::from(self.port_amount);
        let port = (u32::from(self.port_start)..end)
            .filter_map(|p| u16::try_from(p).ok())
            .find(|p| !reserved.contains(p) && self.port_is_free(*p))
            .ok_or(RegistrarError::PortNotFound)?;
        reserved.insert(port);
        debug!("Reserved port {}", port);
        Ok(Endpoint {
            ip: self.ip.clone(),
            port,
        })
    }

    fn release(&self, endpoint: &Endpoint) {
        if self.reserved.lock().remove(&endpoint.port) {
            debug!("Released port {}", endpoint.port);
        }
    }

    fn announce(&self, name: &str, endpoint: &Endpoint) -> Result<(), RegistrarError> {
        use dashmap::mapref::entry::Entry;
        match self.announced.entry(name.to_string()) {
            Entry::Occupied(_) => Err(RegistrarError::AlreadyRegistered(name.to_string())),
            Entry::Vacant(slot) => {
                info!("Announced server {} at {}", name, endpoint);
                slot.insert(endpoint.clone());
                Ok(())
            }
        }
    }

    fn withdraw(&self, name: &str) {
        if self.announced.remove(name).is_some() {
            info!("Withdrew server {}", name);
        }
    }

    async fn probe(&self, name: &str, endpoint: &Endpoint) -> bool {
        let addr = (endpoint.ip.as_str(), endpoint.port);
        match tokio::time::timeout(self.probe_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("Probe of {} at {} failed: {}", name, endpoint, e);
                false
            }
            Err(_) => {
                debug!("Probe of {} at {} timed out", name, endpoint);
                false
            }
        }
    }
}
