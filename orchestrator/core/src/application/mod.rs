// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod single_flight;
pub mod build_cache;
pub mod template_resolver;
pub mod server;
pub mod server_registry;
pub mod myserver;

// Re-export services for convenience
pub use build_cache::ArtifactBuildCache;
pub use myserver::{MyServer, MyServerBuilder};
pub use server::{ServerContext, ServerInstance};
pub use server_registry::ServerRegistry;
pub use single_flight::SingleFlight;
pub use template_resolver::TemplateResolver;
