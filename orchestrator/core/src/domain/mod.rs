// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Core types of the orchestrator: templates and their tags, server
//! instances and their lifecycle, and the seams (loader, artifact provider,
//! registrar, scheduler, output sink) the other layers plug into.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Entities, value objects, errors and capability traits

pub mod artifact;
pub mod events;
pub mod node_config;
pub mod registrar;
pub mod scheduler;
pub mod server;
pub mod server_template;
pub mod tag;
pub mod template;
