// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

#![allow(dead_code)]

use async_trait::async_trait;
use myserver_core::domain::artifact::{ArtifactKey, ArtifactProvider, BuildContext, BuildError};
use myserver_core::domain::node_config::NodeConfig;
use myserver_core::domain::registrar::{Endpoint, RegistrarError, ServerRegistrar};
use myserver_core::domain::server_template::{ServerSettings, ServerTemplate};
use myserver_core::domain::template::{template_factory, TemplateKind};
use myserver_core::MyServer;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Registrar handing out sequential ports; readiness is a switch.
pub struct FakeRegistrar {
    next_port: AtomicU16,
    pub reserved: Mutex<HashSet<u16>>,
    pub announced: Mutex<HashSet<String>>,
    pub ready: AtomicBool,
}

impl Default for FakeRegistrar {
    fn default() -> Self {
        Self {
            next_port: AtomicU16::new(25000),
            reserved: Mutex::new(HashSet::new()),
            announced: Mutex::new(HashSet::new()),
            ready: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl ServerRegistrar for FakeRegistrar {
    fn reserve_endpoint(&self) -> Result<Endpoint, RegistrarError> {
        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        self.reserved.lock().unwrap().insert(port);
        Ok(Endpoint {
            ip: "127.0.0.1".to_string(),
            port,
        })
    }

    fn release(&self, endpoint: &Endpoint) {
        self.reserved.lock().unwrap().remove(&endpoint.port);
    }

    fn announce(&self, name: &str, _endpoint: &Endpoint) -> Result<(), RegistrarError> {
        if !self.announced.lock().unwrap().insert(name.to_string()) {
            return Err(RegistrarError::AlreadyRegistered(name.to_string()));
        }
        Ok(())
    }

    fn withdraw(&self, name: &str) {
        self.announced.lock().unwrap().remove(name);
    }

    async fn probe(&self, _name: &str, _endpoint: &Endpoint) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Artifact that is "built" by writing a small file.
pub struct FakeArtifact {
    version: String,
    fail: bool,
    builds: Arc<AtomicUsize>,
}

#[async_trait]
impl ArtifactProvider for FakeArtifact {
    fn key(&self) -> ArtifactKey {
        ArtifactKey::new("fake", &self.version)
    }

    fn artifact_name(&self) -> String {
        format!("fake-{}.jar", self.version)
    }

    async fn build(&self, ctx: &BuildContext) -> Result<(), BuildError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(BuildError::Fetch {
                url: "https://example.invalid/server.jar".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        tokio::fs::write(&ctx.artifact, format!("jar {}", self.version)).await?;
        Ok(())
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub myserver: MyServer,
    pub registrar: Arc<FakeRegistrar>,
    pub builds: Arc<AtomicUsize>,
}

/// Node rooted in a temp dir, with `server/vanilla` templates backed by
/// [`FakeArtifact`] instead of a real download.
pub fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let mut config = NodeConfig::rooted_at(dir.path());
    config.supervision.probe_interval_ms = 50;

    let registrar = Arc::new(FakeRegistrar::default());
    let myserver = MyServer::builder(config)
        .with_registrar(registrar.clone())
        .build()
        .unwrap();

    let builds = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&builds);
    myserver.resolver().register_type(
        "server/vanilla",
        template_factory(move |chain| {
            let artifact: Arc<dyn ArtifactProvider> = Arc::new(FakeArtifact {
                version: chain.require_string(&["vanilla", "version"])?,
                fail: chain.first_string(&["fake", "fail"]).as_deref() == Some("true"),
                builds: Arc::clone(&counter),
            });
            let settings = ServerSettings::from_chain(chain)?;
            Ok(TemplateKind::Server(ServerTemplate::new(settings, Some(artifact))))
        }),
    );

    Harness {
        dir,
        myserver,
        registrar,
        builds,
    }
}

pub fn write_template(root: &Path, dir: &str, manifest: &str, files: &[(&str, &str)]) {
    let path = root.join("templates").join(dir);
    std::fs::create_dir_all(path.join("files")).unwrap();
    std::fs::write(path.join("template.yml"), manifest).unwrap();
    for (name, content) in files {
        let file = path.join("files").join(name);
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(file, content).unwrap();
    }
}

/// Worker that echoes its input and exits on `stop`.
pub const ECHO_WORKER: &str = r#"echo "ready"
while read line; do
  echo "got $line"
  if [ "$line" = "stop" ]; then
    exit 0
  fi
done
"#;

pub const COMMON_TEMPLATE: &str = r#"
name: base:common@1
tags:
  motd: { default: "Hello" }
  difficulty: { type: choice, choices: [ easy, hard ], default: easy }
templates:
  static: [ "eula.txt" ]
server:
  stop: { commands: [ "stop" ], wait: 5 }
"#;

pub const TEST_TEMPLATE: &str = r#"
name: server/vanilla/1.0:test@1.0
parents: [ "base:common@1" ]
templates:
  dynamic: [ "server.properties" ]
server:
  execute: "sh run.sh"
  start: { commands: [ "hello" ], delay: 0 }
vanilla: { version: "1.0" }
"#;

/// Writes `base:common@1` and `server/vanilla/1.0:test@1.0`.
pub fn write_test_templates(root: &Path) {
    write_template(
        root,
        "common",
        COMMON_TEMPLATE,
        &[
            ("eula.txt", "eula=true # {{SERVER_NAME}}\n"),
            ("common.txt", "from common\n"),
            ("run.sh", "exit 1\n"),
        ],
    );
    write_template(
        root,
        "test",
        TEST_TEMPLATE,
        &[
            ("run.sh", ECHO_WORKER),
            ("server.properties", "motd={{ motd }}\nserver-port={{SERVER_PORT}}\n"),
        ],
    );
}
