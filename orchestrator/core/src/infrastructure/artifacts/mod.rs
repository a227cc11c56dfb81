// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Server Artifact Providers
//!
//! [`ArtifactProvider`](crate::domain::artifact::ArtifactProvider)
//! implementations for the supported server kinds, plus the shared fetch
//! and tool-execution helpers they are built from.

pub mod fetcher;
pub mod paper;
pub mod spigot;
pub mod vanilla;

pub use fetcher::ArtifactFetcher;
pub use paper::PaperArtifact;
pub use spigot::SpigotArtifact;
pub use vanilla::VanillaArtifact;
