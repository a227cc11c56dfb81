// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! MyServer
//!
//! Entry point wiring the orchestration engine together: one scheduler,
//! registrar, build cache, template resolver and server registry per node,
//! with the built-in template types and the local template loader
//! registered.
//!
//! # Architecture
//!
//! - **Layer:** Application
//! - **Purpose:** Composition root and facade over resolver and registry
//!
//! # Registered template types
//!
//! | prefix           | kind                                   |
//! |------------------|----------------------------------------|
//! | `base`           | abstract parent, not a server          |
//! | `server`         | server without an artifact step        |
//! | `server/vanilla` | server running a patched vanilla jar   |
//! | `server/paper`   | server running a Paper jar             |
//! | `server/spigot`  | server running a Spigot jar            |

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::application::build_cache::ArtifactBuildCache;
use crate::application::server::{ServerContext, ServerInstance};
use crate::application::server_registry::ServerRegistry;
use crate::application::template_resolver::TemplateResolver;
use crate::domain::artifact::ArtifactProvider;
use crate::domain::node_config::NodeConfig;
use crate::domain::registrar::ServerRegistrar;
use crate::domain::scheduler::TaskScheduler;
use crate::domain::server::{ServerError, ServerStatus};
use crate::domain::server_template::{ServerSettings, ServerTemplate};
use crate::domain::template::{template_factory, TemplateChain, TemplateError, TemplateKind};
use crate::infrastructure::artifacts::{ArtifactFetcher, PaperArtifact, SpigotArtifact, VanillaArtifact};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::file_tree::ScanOptions;
use crate::infrastructure::registrar::LocalServerRegistrar;
use crate::infrastructure::scheduler::TokioTaskScheduler;
use crate::infrastructure::template_loader::LocalTemplateLoader;

pub struct MyServer {
    config: Arc<NodeConfig>,
    events: EventBus,
    resolver: Arc<TemplateResolver>,
    servers: Arc<ServerRegistry>,
}

impl MyServer {
    pub fn builder(config: NodeConfig) -> MyServerBuilder {
        MyServerBuilder::new(config)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn resolver(&self) -> &Arc<TemplateResolver> {
        &self.resolver
    }

    pub fn servers(&self) -> &Arc<ServerRegistry> {
        &self.servers
    }

    pub async fn create_server(&self, name: &str, template: &str) -> Result<Arc<ServerInstance>, ServerError> {
        self.servers.create(name, template).await
    }

    /// Stops every started server and waits up to `timeout` for each to
    /// reach STOPPED.
    pub async fn shutdown(&self, timeout: Duration) {
        for server in self.servers.context().live_servers() {
            if server.status() != ServerStatus::Started {
                continue;
            }
            if let Err(e) = server.stop().await {
                warn!(server = %server.name(), "Failed to stop server: {}", e);
                continue;
            }
            if tokio::time::timeout(timeout, server.wait_for_status(ServerStatus::Stopped))
                .await
                .is_err()
            {
                warn!(server = %server.name(), "Server did not stop within {:?}", timeout);
            }
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

pub struct MyServerBuilder {
    config: NodeConfig,
    scheduler: Option<Arc<dyn TaskScheduler>>,
    registrar: Option<Arc<dyn ServerRegistrar>>,
    fetcher: Option<ArtifactFetcher>,
    events: Option<EventBus>,
}

impl MyServerBuilder {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            scheduler: None,
            registrar: None,
            fetcher: None,
            events: None,
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn TaskScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_registrar(mut self, registrar: Arc<dyn ServerRegistrar>) -> Self {
        self.registrar = Some(registrar);
        self
    }

    pub fn with_fetcher(mut self, fetcher: ArtifactFetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Validates the configuration and wires the services. Must be called
    /// inside a tokio runtime unless a scheduler was supplied.
    pub fn build(self) -> anyhow::Result<MyServer> {
        self.config.validate().context("Invalid node configuration")?;
        let config = Arc::new(self.config);
        let supervision = &config.supervision;

        let scheduler: Arc<dyn TaskScheduler> = match self.scheduler {
            Some(scheduler) => scheduler,
            None => {
                let runtime = tokio::runtime::Handle::try_current()
                    .context("MyServer must be built inside a tokio runtime")?;
                Arc::new(TokioTaskScheduler::new(runtime))
            }
        };
        let registrar: Arc<dyn ServerRegistrar> = match self.registrar {
            Some(registrar) => registrar,
            None => Arc::new(LocalServerRegistrar::new(
                &config.registrar,
                supervision.probe_timeout(),
            )),
        };
        let fetcher = self
            .fetcher
            .unwrap_or_else(|| ArtifactFetcher::new(supervision.build_timeout()));
        let events = self.events.unwrap_or_default();

        let resolver = Arc::new(TemplateResolver::new());
        resolver.register_loader(
            "local",
            Arc::new(LocalTemplateLoader::new(
                config.folders.templates.clone(),
                ScanOptions {
                    max_depth: supervision.template_scan_depth,
                    follow_links: supervision.follow_links,
                },
            )),
        );
        register_default_types(&resolver, fetcher);

        let build_cache = Arc::new(ArtifactBuildCache::new(
            config.folders.cache.clone(),
            Arc::clone(&scheduler),
        ));
        let ctx = Arc::new(ServerContext::new(
            Arc::clone(&config),
            scheduler,
            registrar,
            build_cache,
            Arc::new(events.clone()),
        ));
        let servers = Arc::new(ServerRegistry::new(ctx, Arc::clone(&resolver)));

        info!(
            "Orchestrator ready (templates: {:?}, servers: {:?}, cache: {:?})",
            config.folders.templates, config.folders.servers, config.folders.cache
        );
        Ok(MyServer {
            config,
            events,
            resolver,
            servers,
        })
    }
}

// ============================================================================
// Template types
// ============================================================================

fn server_kind(
    chain: &TemplateChain<'_>,
    artifact: Option<Arc<dyn ArtifactProvider>>,
) -> Result<TemplateKind, TemplateError> {
    let settings = ServerSettings::from_chain(chain)?;
    Ok(TemplateKind::Server(ServerTemplate::new(settings, artifact)))
}

/// Registers the built-in template types on `resolver`.
pub fn register_default_types(resolver: &TemplateResolver, fetcher: ArtifactFetcher) {
    resolver.register_type("base", template_factory(|_| Ok(TemplateKind::Base)));
    resolver.register_type("server", template_factory(|chain| server_kind(chain, None)));

    let vanilla = fetcher.clone();
    resolver.register_type(
        "server/vanilla",
        template_factory(move |chain| {
            let version = chain.require_string(&["vanilla", "version"])?;
            let artifact: Arc<dyn ArtifactProvider> =
                Arc::new(VanillaArtifact::new(version, vanilla.clone()));
            server_kind(chain, Some(artifact))
        }),
    );

    let paper = fetcher.clone();
    resolver.register_type(
        "server/paper",
        template_factory(move |chain| {
            let version = chain.require_string(&["paper", "version"])?;
            let url = chain.require_string(&["paper", "url"])?;
            let artifact: Arc<dyn ArtifactProvider> =
                Arc::new(PaperArtifact::new(version, url, paper.clone()));
            server_kind(chain, Some(artifact))
        }),
    );

    resolver.register_type(
        "server/spigot",
        template_factory(move |chain| {
            let version = chain.require_string(&["spigot", "version"])?;
            let artifact: Arc<dyn ArtifactProvider> =
                Arc::new(SpigotArtifact::new(version, fetcher.clone()));
            server_kind(chain, Some(artifact))
        }),
    );
}
