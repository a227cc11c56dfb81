// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

mod common;

use common::{harness, write_template, write_test_templates};
use myserver_core::domain::events::ServerEvent;
use myserver_core::domain::server::{ServerError, ServerStatus};
use myserver_core::infrastructure::event_bus::EventReceiver;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(10);

/// Collects console lines until `expected` shows up.
async fn wait_for_line(receiver: &mut EventReceiver, expected: &str) -> Vec<String> {
    let mut seen = Vec::new();
    loop {
        match timeout(WAIT, receiver.recv()).await {
            Ok(Ok(ServerEvent::ConsoleOutput { line, .. })) => {
                let done = line == expected;
                seen.push(line);
                if done {
                    return seen;
                }
            }
            Ok(Ok(_)) => {}
            other => panic!("did not see {:?} (got {:?}, seen {:?})", expected, other.is_ok(), seen),
        }
    }
}

#[tokio::test]
async fn test_create_start_stop_destroy() {
    let h = harness();
    write_test_templates(h.dir.path());
    let mut console = h.myserver.events().subscribe_server("alpha");

    let server = h
        .myserver
        .create_server("alpha", "server/vanilla/1.0:test@1.0")
        .await
        .unwrap();
    assert_eq!(server.status(), ServerStatus::Stopped);

    // Files of every template were copied, nearest wins, statics rendered.
    let files = server.files_path();
    assert_eq!(std::fs::read_to_string(files.join("common.txt")).unwrap(), "from common\n");
    assert!(std::fs::read_to_string(files.join("run.sh")).unwrap().contains("got $line"));
    assert_eq!(std::fs::read_to_string(files.join("eula.txt")).unwrap(), "eula=true # alpha\n");

    tokio_test::assert_ok!(server.start().await);
    timeout(WAIT, server.wait_for_status(ServerStatus::Started))
        .await
        .unwrap()
        .unwrap();

    // Dynamic files see the assigned endpoint, and the artifact is installed.
    let port = server.endpoint().unwrap().port;
    let properties = std::fs::read_to_string(files.join("server.properties")).unwrap();
    assert_eq!(properties, format!("motd=Hello\nserver-port={}\n", port));
    assert_eq!(std::fs::read_to_string(files.join("server.jar")).unwrap(), "jar 1.0");
    assert_eq!(h.builds.load(Ordering::SeqCst), 1);
    assert!(h.registrar.announced.lock().unwrap().contains("alpha"));

    // Start commands are delivered once STARTED.
    wait_for_line(&mut console, "got hello").await;

    assert!(matches!(server.start().await, Err(ServerError::InvalidState(_))));
    assert_eq!(server.status(), ServerStatus::Started);

    tokio_test::assert_ok!(server.stop().await);
    timeout(WAIT, server.wait_for_status(ServerStatus::Stopped))
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(server.stop().await, Err(ServerError::InvalidState(_))));
    assert!(server.endpoint().is_none());
    assert!(h.registrar.announced.lock().unwrap().is_empty());
    assert!(h.registrar.reserved.lock().unwrap().is_empty());

    let servers = h.myserver.servers();
    assert_eq!(servers.list().await.len(), 1);
    servers.destroy(&server).await.unwrap();
    assert!(servers.list().await.is_empty());
    assert!(!server.path().exists());
}

#[tokio::test]
async fn test_restart_reuses_cached_artifact() {
    let h = harness();
    write_test_templates(h.dir.path());
    let server = h
        .myserver
        .create_server("alpha", "server/vanilla/1.0:test@1.0")
        .await
        .unwrap();

    for _ in 0..2 {
        server.start().await.unwrap();
        timeout(WAIT, server.wait_for_status(ServerStatus::Started))
            .await
            .unwrap()
            .unwrap();
        server.stop().await.unwrap();
        timeout(WAIT, server.wait_for_status(ServerStatus::Stopped))
            .await
            .unwrap()
            .unwrap();
    }
    assert_eq!(h.builds.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_required_tag_fails_before_spawn() {
    let h = harness();
    write_template(
        h.dir.path(),
        "seeded",
        r#"
name: server:seeded@1
tags:
  seed: { required: true, description: "World seed" }
server:
  execute: "sh run.sh"
"#,
        &[("run.sh", common::ECHO_WORKER)],
    );
    let server = h.myserver.create_server("beta", "seeded").await.unwrap();

    let err = server.start().await.unwrap_err();
    assert!(matches!(err, ServerError::InvalidState(ref m) if m.contains("seed")));
    assert_eq!(server.status(), ServerStatus::Error);
    assert!(h.registrar.reserved.lock().unwrap().is_empty());

    // ERROR is startable again once the tag is set.
    server.set_tag("seed", "42").unwrap();
    server.start().await.unwrap();
    timeout(WAIT, server.wait_for_status(ServerStatus::Started))
        .await
        .unwrap()
        .unwrap();
    server.send_command("stop").await.unwrap();
    timeout(WAIT, server.wait_for_status(ServerStatus::Stopped))
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_build_failure_leaves_error_and_releases_endpoint() {
    let h = harness();
    write_template(
        h.dir.path(),
        "broken",
        r#"
name: server/vanilla:broken@1
server:
  execute: "sh run.sh"
vanilla: { version: "9.9" }
fake: { fail: true }
"#,
        &[("run.sh", common::ECHO_WORKER)],
    );
    let server = h.myserver.create_server("gamma", "broken").await.unwrap();

    let err = server.start().await.unwrap_err();
    assert!(matches!(err, ServerError::Build(_)));
    assert_eq!(server.status(), ServerStatus::Error);
    assert!(h.registrar.reserved.lock().unwrap().is_empty());
    assert!(h.registrar.announced.lock().unwrap().is_empty());
    assert!(!server.files_path().join("server.jar").exists());
}

#[tokio::test]
async fn test_unresponsive_server_is_killed_after_stop_wait() {
    let h = harness();
    write_template(
        h.dir.path(),
        "sleeper",
        r#"
name: server:sleeper@1
server:
  execute: "sleep 30"
  stop: { wait: 0 }
"#,
        &[],
    );
    let server = h.myserver.create_server("delta", "sleeper").await.unwrap();

    server.start().await.unwrap();
    timeout(WAIT, server.wait_for_status(ServerStatus::Started))
        .await
        .unwrap()
        .unwrap();
    server.stop().await.unwrap();
    timeout(WAIT, server.wait_for_status(ServerStatus::Stopped))
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        server.send_command("anyone there").await,
        Err(ServerError::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_stop_with_closed_input_is_invalid_state_and_kills() {
    let h = harness();
    write_template(
        h.dir.path(),
        "deaf",
        r#"
name: server:deaf@1
server:
  execute: "sh run.sh"
  stop: { commands: ["stop"], wait: 60 }
"#,
        &[("run.sh", "exec 0<&-\nsleep 30\n")],
    );
    let server = h.myserver.create_server("zeta", "deaf").await.unwrap();

    server.start().await.unwrap();
    timeout(WAIT, server.wait_for_status(ServerStatus::Started))
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(server.stop().await, Err(ServerError::InvalidState(_))));
    // Well inside the 60s stop wait.
    timeout(WAIT, server.wait_for_status(ServerStatus::Stopped))
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_server_stays_starting_until_probe_succeeds() {
    let h = harness();
    write_test_templates(h.dir.path());
    h.registrar.ready.store(false, Ordering::SeqCst);
    let server = h
        .myserver
        .create_server("epsilon", "server/vanilla/1.0:test@1.0")
        .await
        .unwrap();

    server.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.status(), ServerStatus::Starting);
    assert!(matches!(server.stop().await, Err(ServerError::InvalidState(_))));

    h.registrar.ready.store(true, Ordering::SeqCst);
    timeout(WAIT, server.wait_for_status(ServerStatus::Started))
        .await
        .unwrap()
        .unwrap();

    h.myserver.shutdown(WAIT).await;
    assert_eq!(server.status(), ServerStatus::Stopped);
}
