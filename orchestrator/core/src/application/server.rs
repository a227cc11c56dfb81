// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Server Lifecycle
//!
//! A [`ServerInstance`] is one persisted worker created from a server
//! template. It owns its tag overrides and permission grants, renders the
//! template's files into its file tree and supervises the worker process
//! through the lifecycle described in `domain::server`.
//!
//! # Architecture
//!
//! - **Layer:** Application
//! - **Purpose:** Per-instance state machine, process supervision and file rendering
//!
//! Status lives in a `watch` channel so transitions are atomic
//! check-and-set operations and callers can wait for a target status.
//! Output pumping, readiness probing and the forced kill run as tasks on
//! the shared [`TaskScheduler`].

use chrono::Local;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::build_cache::ArtifactBuildCache;
use crate::domain::node_config::NodeConfig;
use crate::domain::registrar::{Endpoint, ServerRegistrar};
use crate::domain::scheduler::{RepeatingTask, ScheduledTask, TaskHandle, TaskScheduler};
use crate::domain::server::{OutputSink, ServerError, ServerInfo, ServerManifest, ServerStatus};
use crate::domain::server_template::{ServerSettings, ServerTemplate};
use crate::domain::template::{Template, TemplateError, TemplateFileClass, FILES_DIR};
use crate::infrastructure::manifest_parser::ManifestParser;
use crate::infrastructure::templater::Templater;

// ============================================================================
// Shared context
// ============================================================================

/// Services shared by every instance, plus the table of running ones.
pub struct ServerContext {
    pub config: Arc<NodeConfig>,
    pub scheduler: Arc<dyn TaskScheduler>,
    pub registrar: Arc<dyn ServerRegistrar>,
    pub build_cache: Arc<ArtifactBuildCache>,
    pub output: Arc<dyn OutputSink>,
    /// Instances with a live process, held strongly until the process ends.
    live: DashMap<Uuid, Arc<ServerInstance>>,
}

impl ServerContext {
    pub fn new(
        config: Arc<NodeConfig>,
        scheduler: Arc<dyn TaskScheduler>,
        registrar: Arc<dyn ServerRegistrar>,
        build_cache: Arc<ArtifactBuildCache>,
        output: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            config,
            scheduler,
            registrar,
            build_cache,
            output,
            live: DashMap::new(),
        }
    }

    pub fn live(&self, uuid: &Uuid) -> Option<Arc<ServerInstance>> {
        self.live.get(uuid).map(|entry| Arc::clone(entry.value()))
    }

    pub fn live_servers(&self) -> Vec<Arc<ServerInstance>> {
        self.live.iter().map(|entry| Arc::clone(entry.value())).collect()
    }
}

// ============================================================================
// Instance
// ============================================================================

#[derive(Debug)]
struct InstanceState {
    name: String,
    tags: BTreeMap<String, String>,
    permissions: BTreeMap<String, Vec<String>>,
    endpoint: Option<Endpoint>,
    announced: bool,
}

pub struct ServerInstance {
    uuid: Uuid,
    template: Arc<Template>,
    server: ServerTemplate,
    path: PathBuf,
    ctx: Arc<ServerContext>,
    state: RwLock<InstanceState>,
    status: watch::Sender<ServerStatus>,
    process: Mutex<Option<Child>>,
    input: tokio::sync::Mutex<Option<ChildStdin>>,
    probe: Mutex<Option<TaskHandle>>,
    kill_task: Mutex<Option<TaskHandle>>,
}

impl ServerInstance {
    /// Builds an instance from its manifest. The template must be a server
    /// template and the manifest must carry `uuid` and `name`.
    pub fn new(
        ctx: Arc<ServerContext>,
        template: Arc<Template>,
        path: impl Into<PathBuf>,
        manifest: &ServerManifest,
    ) -> Result<Self, ServerError> {
        let uuid = manifest.require_uuid()?;
        let name = manifest.require_name()?.to_string();
        let server = template.server().cloned().ok_or_else(|| {
            ServerError::InvalidServer(format!("{} is not a server template", template.full_name()))
        })?;
        let (status, _) = watch::channel(ServerStatus::Stopped);
        Ok(Self {
            uuid,
            template,
            server,
            path: path.into(),
            ctx,
            state: RwLock::new(InstanceState {
                name,
                tags: manifest.tags.clone(),
                permissions: manifest.permissions.clone(),
                endpoint: None,
                announced: false,
            }),
            status,
            process: Mutex::new(None),
            input: tokio::sync::Mutex::new(None),
            probe: Mutex::new(None),
            kill_task: Mutex::new(None),
        })
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn name(&self) -> String {
        self.state.read().name.clone()
    }

    pub fn template(&self) -> &Arc<Template> {
        &self.template
    }

    pub fn settings(&self) -> &ServerSettings {
        self.server.settings()
    }

    /// Instance directory holding the manifest.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Root of the worker's file tree; the process runs here.
    pub fn files_path(&self) -> PathBuf {
        self.path.join(FILES_DIR)
    }

    pub fn status(&self) -> ServerStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ServerStatus> {
        self.status.subscribe()
    }

    /// Resolves once the instance reaches `target`.
    pub async fn wait_for_status(&self, target: ServerStatus) -> Result<(), ServerError> {
        let mut receiver = self.status.subscribe();
        receiver
            .wait_for(|status| *status == target)
            .await
            .map(|_| ())
            .map_err(|_| ServerError::InvalidState("Status channel closed".to_string()))
    }

    pub fn endpoint(&self) -> Option<Endpoint> {
        self.state.read().endpoint.clone()
    }

    pub fn info(&self) -> ServerInfo {
        let state = self.state.read();
        ServerInfo {
            uuid: self.uuid,
            name: state.name.clone(),
            template: self.template.full_name(),
            status: self.status(),
            endpoint: state.endpoint.clone(),
            path: self.path.clone(),
            tags: self.effective_tags(&state),
            permissions: state.permissions.clone(),
        }
    }

    // ========================================================================
    // Tags and permissions
    // ========================================================================

    /// The instance's own value for `name`, ignoring template defaults.
    pub fn tag(&self, name: &str) -> Option<String> {
        self.state.read().tags.get(name).cloned()
    }

    /// Override, else template default, else `fallback`.
    pub fn tag_or(&self, name: &str, fallback: &str) -> String {
        self.tag(name)
            .or_else(|| self.template.tag(name).and_then(|t| t.default_value.clone()))
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Every tag with a value: template defaults overlaid by overrides.
    pub fn all_tags(&self) -> BTreeMap<String, String> {
        self.effective_tags(&self.state.read())
    }

    fn effective_tags(&self, state: &InstanceState) -> BTreeMap<String, String> {
        let mut tags: BTreeMap<String, String> = self
            .template
            .tags()
            .iter()
            .filter_map(|(name, tag)| tag.default_value.clone().map(|v| (name.clone(), v)))
            .collect();
        tags.extend(state.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        tags
    }

    /// Overrides a declared tag, persists the manifest and re-renders the
    /// dynamic files.
    pub fn set_tag(&self, name: &str, value: &str) -> Result<(), ServerError> {
        let tag = self
            .template
            .tag(name)
            .ok_or_else(|| ServerError::InvalidServer(format!("Unknown tag: {}", name)))?;
        if !tag.validate(value) {
            return Err(ServerError::InvalidServer(format!(
                "Invalid value '{}' for {} tag {}",
                value, tag.tag_type, name
            )));
        }
        self.state
            .write()
            .tags
            .insert(name.to_string(), value.to_string());
        self.save()?;
        self.update_files(TemplateFileClass::Dynamic)
    }

    /// Drops the override for `name`. Returns whether one existed.
    pub fn reset_tag(&self, name: &str) -> Result<bool, ServerError> {
        let removed = self.state.write().tags.remove(name).is_some();
        if removed {
            self.save()?;
            self.update_files(TemplateFileClass::Dynamic)?;
        }
        Ok(removed)
    }

    pub fn grant(&self, permission: &str, principal: &str) -> Result<(), ServerError> {
        {
            let mut state = self.state.write();
            let principals = state.permissions.entry(permission.to_string()).or_default();
            if principals.iter().any(|p| p == principal) {
                return Ok(());
            }
            principals.push(principal.to_string());
        }
        self.save()
    }

    pub fn has_permission(&self, permission: &str, principal: &str) -> bool {
        self.state
            .read()
            .permissions
            .get(permission)
            .is_some_and(|principals| principals.iter().any(|p| p == principal))
    }

    // ========================================================================
    // Persistence and rendering
    // ========================================================================

    pub fn manifest(&self) -> ServerManifest {
        let state = self.state.read();
        ServerManifest {
            uuid: Some(self.uuid),
            name: Some(state.name.clone()),
            template: Some(self.template.full_name()),
            permissions: state.permissions.clone(),
            tags: state.tags.clone(),
        }
    }

    pub fn save(&self) -> Result<(), ServerError> {
        ManifestParser::write_instance_dir(&self.path, &self.manifest())
    }

    /// Variables available to rendered files and the start command.
    pub fn templater(&self) -> Templater {
        let state = self.state.read();
        let (ip, port) = match &state.endpoint {
            Some(endpoint) => (endpoint.ip.clone(), endpoint.port.to_string()),
            None => ("invalid".to_string(), "invalid".to_string()),
        };
        Templater::new()
            .with_vars(self.effective_tags(&state))
            .with_var(
                "DATE_GENERATED",
                Local::now().format("%Y/%m/%d %H:%M:%S").to_string(),
            )
            .with_var("SERVER_NAME", state.name.clone())
            .with_var("SERVER_UUID", self.uuid.to_string())
            .with_var("SERVER_IP", ip)
            .with_var("SERVER_PORT", port)
    }

    /// Renders every templated file of `class` from the nearest template
    /// shipping it into the instance's file tree.
    pub fn update_files(&self, class: TemplateFileClass) -> Result<(), ServerError> {
        let templater = self.templater();
        let files = self.files_path();
        for relative in self.template.files(class) {
            let source = self.template.source_file(relative).ok_or_else(|| {
                TemplateError::InvalidTemplate(format!(
                    "{}: templated file {} not found",
                    self.template.full_name(),
                    relative.display()
                ))
            })?;
            let target = files.join(relative);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let reader = BufReader::new(File::open(&source)?);
            let mut writer = BufWriter::new(File::create(&target)?);
            templater.render_stream(reader, &mut writer)?;
            writer.flush()?;
            debug!("Rendered {}", target.display());
        }
        Ok(())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Starts the worker. Returns once the process is spawned; the instance
    /// reaches STARTED when the readiness probe succeeds.
    pub async fn start(self: &Arc<Self>) -> Result<(), ServerError> {
        let mut rejected = None;
        self.status.send_if_modified(|status| match status.check_startable() {
            Ok(()) => {
                *status = ServerStatus::Init;
                true
            }
            Err(e) => {
                rejected = Some(e);
                false
            }
        });
        if let Some(e) = rejected {
            return Err(e);
        }
        self.notify(ServerStatus::Init);
        info!(server = %self.name(), "Starting server");

        match self.launch().await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(server = %self.name(), "Failed to start server: {}", e);
                self.release_endpoint();
                self.set_status(ServerStatus::Error);
                Err(e)
            }
        }
    }

    async fn launch(self: &Arc<Self>) -> Result<(), ServerError> {
        let name = self.name();
        {
            let state = self.state.read();
            for (tag_name, tag) in self.template.tags() {
                if tag.required && tag.default_value.is_none() && !state.tags.contains_key(tag_name) {
                    return Err(ServerError::InvalidState(format!(
                        "Required Tag Missing: {} - {}",
                        tag_name,
                        tag.describe()
                    )));
                }
            }
        }

        let endpoint = self.ctx.registrar.reserve_endpoint()?;
        self.state.write().endpoint = Some(endpoint.clone());
        self.ctx.registrar.announce(&name, &endpoint)?;
        self.state.write().announced = true;

        self.update_files(TemplateFileClass::Dynamic)?;
        if let Some(artifact) = self.server.artifact() {
            self.ctx.build_cache.prepare(artifact, &self.files_path()).await?;
        }

        let execute = self.settings().execute.as_deref().ok_or_else(|| {
            ServerError::InvalidServer(format!(
                "{} does not define server.execute",
                self.template.full_name()
            ))
        })?;
        let rendered = self.templater().render(execute)?;
        let mut words = rendered.split_whitespace();
        let program = words
            .next()
            .ok_or_else(|| ServerError::InvalidServer("Start command is empty".to_string()))?;

        self.set_status(ServerStatus::Starting);
        let mut child = Command::new(program)
            .args(words)
            .current_dir(self.files_path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        info!(server = %name, pid = ?child.id(), "Spawned `{}` at {}", rendered, endpoint);

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        *self.input.lock().await = child.stdin.take();
        *self.process.lock() = Some(child);
        self.ctx.live.insert(self.uuid, Arc::clone(self));

        if let Some(stderr) = stderr {
            let this = Arc::clone(self);
            let name = name.clone();
            self.ctx.scheduler.run_async(Box::pin(async move {
                let mut lines = tokio::io::BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    this.ctx.output.handle_output(&name, &line);
                }
            }));
        }

        let this = Arc::clone(self);
        self.ctx.scheduler.run_async(Box::pin(async move {
            if let Some(stdout) = stdout {
                let mut lines = tokio::io::BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    this.ctx.output.handle_output(&name, &line);
                }
            }
            this.on_process_exit().await;
        }));

        self.schedule_probe();
        Ok(())
    }

    /// Sends the stop commands and schedules a forced kill after the
    /// template's stop wait. The instance reaches STOPPED when the process
    /// is gone.
    pub async fn stop(self: &Arc<Self>) -> Result<(), ServerError> {
        let mut rejected = None;
        self.status.send_if_modified(|status| match status.check_stoppable() {
            Ok(()) => {
                *status = ServerStatus::Stopping;
                true
            }
            Err(e) => {
                rejected = Some(e);
                false
            }
        });
        if let Some(e) = rejected {
            return Err(e);
        }
        self.notify(ServerStatus::Stopping);
        info!(server = %self.name(), "Stopping server");

        let weak = Arc::downgrade(self);
        let kill = self.ctx.scheduler.schedule(
            Box::pin(async move {
                if let Some(this) = weak.upgrade() {
                    this.force_kill();
                }
            }),
            self.settings().stop_wait,
        );
        if let Some(previous) = self.kill_task.lock().replace(kill) {
            self.ctx.scheduler.cancel(previous);
        }

        for command in &self.settings().stop_commands {
            if let Err(e) = self.send_command(command).await {
                // Input is gone, so the stop commands cannot work; skip the wait.
                warn!(server = %self.name(), "Could not send stop command: {}", e);
                self.force_kill();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Writes one line to the worker's input.
    pub async fn send_command(&self, command: &str) -> Result<(), ServerError> {
        let mut input = self.input.lock().await;
        let stdin = input.as_mut().ok_or_else(|| {
            ServerError::InvalidState("Server is not accepting commands".to_string())
        })?;
        stdin.write_all(command.as_bytes()).await.map_err(closed_input)?;
        stdin.write_all(b"\n").await.map_err(closed_input)?;
        stdin.flush().await.map_err(closed_input)?;
        debug!(server = %self.name(), "Sent command: {}", command);
        Ok(())
    }

    /// Removes the instance's storage. Does not stop a running process.
    pub async fn destroy(&self) -> Result<(), ServerError> {
        let status = self.status();
        if status.is_active() {
            warn!(server = %self.name(), "Destroying server while {}", status);
        }
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if !status.is_active() {
            self.set_status(ServerStatus::Unknown);
        }
        info!(server = %self.name(), "Destroyed server");
        Ok(())
    }

    // ========================================================================
    // Supervision
    // ========================================================================

    fn schedule_probe(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let task: RepeatingTask = Arc::new(move || {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(this) = weak.upgrade() {
                    this.probe_tick().await;
                }
            }) as ScheduledTask
        });
        let interval = self.ctx.config.supervision.probe_interval();
        let handle = self.ctx.scheduler.schedule_repeating(task, interval, interval);
        if let Some(previous) = self.probe.lock().replace(handle) {
            self.ctx.scheduler.cancel(previous);
        }
    }

    async fn probe_tick(self: &Arc<Self>) {
        let alive = self.process.lock().is_some();
        let endpoint = self.endpoint();
        let endpoint = match endpoint {
            Some(endpoint) if alive && self.status() == ServerStatus::Starting => endpoint,
            _ => {
                self.cancel_probe();
                return;
            }
        };
        if self.ctx.registrar.probe(&self.name(), &endpoint).await {
            self.on_server_start();
        } else {
            debug!(server = %self.name(), "Server is not ready yet");
        }
    }

    fn on_server_start(self: &Arc<Self>) {
        let started = self.status.send_if_modified(|status| {
            if *status == ServerStatus::Starting {
                *status = ServerStatus::Started;
                true
            } else {
                false
            }
        });
        if started {
            self.notify(ServerStatus::Started);
            info!(server = %self.name(), "Server is ready");
            self.schedule_start_commands();
        }
        // Runs inside the probe task; nothing may follow the cancel.
        self.cancel_probe();
    }

    fn schedule_start_commands(self: &Arc<Self>) {
        let commands = self.settings().start_commands.clone();
        if commands.is_empty() {
            return;
        }
        let weak = Arc::downgrade(self);
        self.ctx.scheduler.schedule(
            Box::pin(async move {
                let Some(this) = weak.upgrade() else {
                    return;
                };
                for command in &commands {
                    if let Err(e) = this.send_command(command).await {
                        warn!(server = %this.name(), "Failed to send start command: {}", e);
                        break;
                    }
                }
            }),
            self.settings().start_delay,
        );
    }

    fn force_kill(&self) {
        if let Some(child) = self.process.lock().as_mut() {
            warn!(server = %self.name(), "Server did not stop in time, killing it");
            if let Err(e) = child.start_kill() {
                warn!(server = %self.name(), "Failed to kill server: {}", e);
            }
        }
    }

    /// Runs once the worker's output closes.
    async fn on_process_exit(&self) {
        self.input.lock().await.take();
        let child = self.process.lock().take();
        if let Some(mut child) = child {
            let name = self.name();
            match tokio::time::timeout(self.settings().stop_wait, child.wait()).await {
                Ok(Ok(exit)) => info!(server = %name, "Server exited with {}", exit),
                Ok(Err(e)) => warn!(server = %name, "Failed to wait for server: {}", e),
                Err(_) => {
                    warn!(server = %name, "Server closed its output but kept running, killing it");
                    if let Err(e) = child.kill().await {
                        warn!(server = %name, "Failed to kill server: {}", e);
                    }
                }
            }
        }
        self.on_server_stop();
    }

    fn on_server_stop(&self) {
        self.cancel_probe();
        if let Some(kill) = self.kill_task.lock().take() {
            self.ctx.scheduler.cancel(kill);
        }
        self.release_endpoint();
        // Before the status change, so a restart woken by STOPPED keeps its entry.
        self.ctx.live.remove(&self.uuid);
        self.set_status(ServerStatus::Stopped);
    }

    fn cancel_probe(&self) {
        let handle = self.probe.lock().take();
        if let Some(handle) = handle {
            self.ctx.scheduler.cancel(handle);
        }
    }

    fn release_endpoint(&self) {
        let (name, endpoint, announced) = {
            let mut state = self.state.write();
            (
                state.name.clone(),
                state.endpoint.take(),
                std::mem::take(&mut state.announced),
            )
        };
        if announced {
            self.ctx.registrar.withdraw(&name);
        }
        if let Some(endpoint) = endpoint {
            self.ctx.registrar.release(&endpoint);
        }
    }

    fn set_status(&self, status: ServerStatus) {
        self.status.send_replace(status);
        self.notify(status);
    }

    fn notify(&self, status: ServerStatus) {
        self.ctx.output.status_changed(&self.name(), self.uuid, status);
    }
}

/// A worker that closed its input is not accepting commands.
fn closed_input(err: std::io::Error) -> ServerError {
    if err.kind() == std::io::ErrorKind::BrokenPipe {
        ServerError::InvalidState("Server is not accepting commands".to_string())
    } else {
        err.into()
    }
}

impl std::fmt::Debug for ServerInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerInstance")
            .field("uuid", &self.uuid)
            .field("name", &self.name())
            .field("template", &self.template.full_name())
            .field("status", &self.status())
            .finish()
    }
}
