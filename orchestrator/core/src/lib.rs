// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! MyServer Core
//!
//! Orchestrates game-server workers built from inheritable templates:
//! resolves template hierarchies, caches server artifacts, renders
//! configuration files and supervises worker processes.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Library entry point; re-exports the domain

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use application::{MyServer, MyServerBuilder};
pub use domain::*;
