// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Server Registry
//!
//! Enumerates instances from the servers folder, creates and destroys
//! them, and keeps instance identity stable: a running instance is always
//! the same object (held by the [`ServerContext`]), and an idle one is
//! reused for as long as anything still holds it.
//!
//! # Architecture
//!
//! - **Layer:** Application
//! - **Purpose:** Instance discovery, lookup, creation and identity caching

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::FutureExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::server::{ServerContext, ServerInstance};
use crate::application::single_flight::SingleFlight;
use crate::application::template_resolver::TemplateResolver;
use crate::domain::server::{ServerError, ServerManifest, INSTANCE_MANIFEST};
use crate::domain::template::{Template, TemplateClass, TemplateFileClass, FILES_DIR};
use crate::infrastructure::file_tree::{copy_tree, discover_manifest_dirs, ScanOptions};
use crate::infrastructure::manifest_parser::ManifestParser;

type ScanResult = Arc<Vec<Arc<ServerInstance>>>;

pub struct ServerRegistry {
    ctx: Arc<ServerContext>,
    resolver: Arc<TemplateResolver>,
    idle: DashMap<Uuid, Weak<ServerInstance>>,
    scans: SingleFlight<(), ScanResult>,
    completed_scans: AtomicU64,
}

impl ServerRegistry {
    pub fn new(ctx: Arc<ServerContext>, resolver: Arc<TemplateResolver>) -> Self {
        Self {
            ctx,
            resolver,
            idle: DashMap::new(),
            scans: SingleFlight::new(),
            completed_scans: AtomicU64::new(0),
        }
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    /// Number of directory scans run so far.
    pub fn completed_scans(&self) -> u64 {
        self.completed_scans.load(Ordering::Relaxed)
    }

    /// Every loadable instance under the servers folder. Concurrent callers
    /// share one scan; instances that fail to load are logged and skipped.
    pub async fn list(self: &Arc<Self>) -> Vec<Arc<ServerInstance>> {
        let this = Arc::clone(self);
        let scheduler = Arc::clone(&self.ctx.scheduler);
        let scan = self
            .scans
            .run((), move || {
                let (tx, rx) = oneshot::channel();
                scheduler.run_async(Box::pin(async move {
                    let _ = tx.send(Arc::new(this.scan().await));
                }));
                async move { rx.await.unwrap_or_default() }.boxed()
            })
            .await;
        scan.to_vec()
    }

    /// Instance whose name or uuid is `id`.
    pub async fn get(self: &Arc<Self>, id: &str) -> Result<Arc<ServerInstance>, ServerError> {
        self.list()
            .await
            .into_iter()
            .find(|server| server.name() == id || server.uuid().to_string() == id)
            .ok_or_else(|| ServerError::NoSuchServer(id.to_string()))
    }

    pub async fn has_server(self: &Arc<Self>, id: &str) -> bool {
        self.get(id).await.is_ok()
    }

    async fn scan(&self) -> Vec<Arc<ServerInstance>> {
        let root = self.ctx.config.folders.servers.clone();
        let options = ScanOptions {
            max_depth: self.ctx.config.supervision.server_scan_depth,
            follow_links: self.ctx.config.supervision.follow_links,
        };
        let dirs = match tokio::task::spawn_blocking(move || {
            discover_manifest_dirs(&root, INSTANCE_MANIFEST, options)
        })
        .await
        {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Server scan failed: {}", e);
                return Vec::new();
            }
        };

        let mut servers = Vec::with_capacity(dirs.len());
        for dir in dirs {
            match self.load(&dir).await {
                Ok(server) => servers.push(server),
                Err(e) => warn!("Skipping server in {:?}: {}", dir, e),
            }
        }
        self.idle.retain(|_, weak| weak.strong_count() > 0);
        let scan = self.completed_scans.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Scan {} found {} servers", scan, servers.len());
        servers
    }

    /// Loads the instance stored in `dir`, reusing the existing object for
    /// its uuid when there is one.
    pub async fn load(&self, dir: &Path) -> Result<Arc<ServerInstance>, ServerError> {
        let manifest = ManifestParser::parse_instance_dir(dir)?;
        let uuid = manifest.require_uuid()?;
        manifest.require_name()?;

        if let Some(live) = self.ctx.live(&uuid) {
            return Ok(live);
        }
        if let Some(idle) = self.idle.get(&uuid).and_then(|weak| weak.upgrade()) {
            return Ok(idle);
        }

        let template = self
            .resolver
            .resolve(manifest.require_template()?, TemplateClass::Server)
            .await?;
        let server = ServerInstance::new(Arc::clone(&self.ctx), template, dir, &manifest)?;
        Ok(self.remember(Arc::new(server)))
    }

    /// Creates a new instance of a server template.
    ///
    /// The template's file trees are copied oldest ancestor first, so nearer
    /// templates overwrite, then the manifest is saved and static files are
    /// rendered. A failed creation leaves nothing behind.
    pub async fn create(self: &Arc<Self>, name: &str, template: &str) -> Result<Arc<ServerInstance>, ServerError> {
        validate_name(name)?;
        let template = self.resolver.resolve(template, TemplateClass::Server).await?;
        if self.has_server(name).await {
            return Err(ServerError::InvalidServer(format!(
                "A server named {} already exists",
                name
            )));
        }

        let root = self.ctx.config.folders.servers.clone();
        let path = root.join(name);
        tokio::fs::create_dir_all(&root).await?;
        match tokio::fs::create_dir(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(ServerError::InvalidServer(format!(
                    "Server folder {:?} already exists",
                    path
                )));
            }
            Err(e) => return Err(e.into()),
        }

        let manifest = ServerManifest {
            uuid: Some(Uuid::new_v4()),
            name: Some(name.to_string()),
            template: Some(template.full_name()),
            ..Default::default()
        };
        let sources: Vec<PathBuf> = template
            .lineage()
            .into_iter()
            .rev()
            .map(|t| t.definition().files_dir())
            .collect();

        match self.populate(&path, &template, &manifest, sources).await {
            Ok(server) => {
                info!("Created server {} from {}", name, template.full_name());
                Ok(self.remember(Arc::new(server)))
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_dir_all(&path).await {
                    warn!("Failed to clean up {:?}: {}", path, cleanup);
                }
                Err(e)
            }
        }
    }

    async fn populate(
        &self,
        path: &Path,
        template: &Arc<Template>,
        manifest: &ServerManifest,
        sources: Vec<PathBuf>,
    ) -> Result<ServerInstance, ServerError> {
        let files = path.join(FILES_DIR);
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::create_dir_all(&files)?;
            for source in &sources {
                copy_tree(source, &files)?;
            }
            Ok(())
        })
        .await
        .map_err(|e| ServerError::Io(std::io::Error::other(e)))??;

        let server = ServerInstance::new(Arc::clone(&self.ctx), Arc::clone(template), path, manifest)?;
        server.save()?;
        server.update_files(TemplateFileClass::Static)?;
        Ok(server)
    }

    /// Removes an instance's storage and forgets it.
    pub async fn destroy(&self, server: &Arc<ServerInstance>) -> Result<(), ServerError> {
        server.destroy().await?;
        self.idle.remove(&server.uuid());
        Ok(())
    }

    fn remember(&self, server: Arc<ServerInstance>) -> Arc<ServerInstance> {
        match self.idle.entry(server.uuid()) {
            Entry::Occupied(mut slot) => {
                if let Some(existing) = slot.get().upgrade() {
                    return existing;
                }
                slot.insert(Arc::downgrade(&server));
                server
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::downgrade(&server));
                server
            }
        }
    }
}

/// Names are non-empty runs of `[0-9a-zA-Z.-]` and not only dots.
fn validate_name(name: &str) -> Result<(), ServerError> {
    let allowed = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if name.is_empty() || !allowed || name.chars().all(|c| c == '.') {
        return Err(ServerError::InvalidServer(format!(
            "Illegal server name: {:?}",
            name
        )));
    }
    Ok(())
}
