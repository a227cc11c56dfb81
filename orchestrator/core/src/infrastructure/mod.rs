// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod artifacts;
pub mod file_tree;
pub mod event_bus;
pub mod manifest_parser;
pub mod registrar;
pub mod scheduler;
pub mod template_loader;
pub mod templater;

pub use event_bus::{EventBus, EventBusError, EventReceiver};
