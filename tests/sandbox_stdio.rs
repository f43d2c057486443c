// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Integration tests against the real worker binary over stdio.

use serde_json::{json, Value};
use skillgate::config::SandboxConfig;
use skillgate::core::constants::{codes, sandbox as sandbox_consts};
use skillgate::core::errors::SandboxError;
use skillgate::core::models::ExecuteParams;
use skillgate::sandbox::supervisor::SandboxSupervisor;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

fn worker_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_skillgate"))
}

#[test]
fn worker_answers_every_frame_exactly_once() {
    let mut child = std::process::Command::new(worker_bin())
        .arg(sandbox_consts::WORKER_MODE)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .spawn()
        .expect("failed to spawn worker");

    {
        let stdin = child.stdin.as_mut().expect("worker stdin");
        writeln!(stdin, r#"{{"id":"a","method":"healthcheck"}}"#).unwrap();
        writeln!(stdin, "this is not json").unwrap();
        writeln!(stdin).unwrap(); // blank lines are skipped, not answered
        writeln!(stdin, r#"{{"id":"b","method":"no-such-method"}}"#).unwrap();
    }

    let stdout = child.stdout.take().expect("worker stdout");
    let mut lines = BufReader::new(stdout).lines();
    let mut next = || -> Value {
        serde_json::from_str(&lines.next().expect("worker closed stdout").unwrap()).unwrap()
    };

    let first = next();
    assert_eq!(first["id"], "a");
    assert_eq!(first["ok"], true);
    assert_eq!(first["result"]["status"], "ok");

    let second = next();
    assert!(second["id"].is_null());
    assert_eq!(second["ok"], false);
    assert!(second["error"].as_str().unwrap().contains("malformed"));

    let third = next();
    assert_eq!(third["id"], "b");
    assert_eq!(third["ok"], false);

    // EOF on stdin is a clean shutdown.
    drop(child.stdin.take());
    let status = child.wait().unwrap();
    assert!(status.success());
}

fn spawn_supervisor(config: &SandboxConfig) -> SandboxSupervisor {
    SandboxSupervisor::spawn_with_program(config, &worker_bin()).expect("spawn worker")
}

#[tokio::test]
async fn supervisor_correlates_concurrent_calls() {
    let supervisor = spawn_supervisor(&SandboxConfig::default());

    let (a, b, c) = tokio::join!(
        supervisor.healthcheck(),
        supervisor.healthcheck(),
        supervisor.healthcheck(),
    );
    for result in [a, b, c] {
        assert_eq!(result.unwrap()["status"], "ok");
    }

    supervisor.close().await;
}

#[tokio::test]
async fn closed_supervisor_rejects_new_calls() {
    let supervisor = spawn_supervisor(&SandboxConfig::default());
    supervisor.close().await;
    assert!(matches!(
        supervisor.healthcheck().await,
        Err(SandboxError::Closed)
    ));
    assert!(!supervisor.is_running().await);
}

#[tokio::test]
async fn blocked_command_is_surfaced_as_worker_error() {
    let config = SandboxConfig {
        command_allowlist: vec!["default".to_string()],
        ..SandboxConfig::default()
    };
    let supervisor = spawn_supervisor(&config);

    let err = supervisor
        .execute(ExecuteParams {
            skill_path: PathBuf::from("/nonexistent"),
            entrypoint: None,
            command: Some("forbidden".to_string()),
            payload: None,
        })
        .await
        .unwrap_err();
    match err {
        SandboxError::Worker(message) => assert!(message.contains(codes::COMMAND_BLOCKED)),
        other => panic!("unexpected error: {other:?}"),
    }

    supervisor.close().await;
}

#[tokio::test]
async fn repeated_worker_faults_open_the_breaker() {
    let config = SandboxConfig {
        command_allowlist: vec!["default".to_string()],
        ..SandboxConfig::default()
    };
    let supervisor = spawn_supervisor(&config);
    let params = || ExecuteParams {
        skill_path: PathBuf::from("/nonexistent"),
        entrypoint: None,
        command: Some("forbidden".to_string()),
        payload: None,
    };

    for _ in 0..3 {
        assert!(matches!(
            supervisor.execute(params()).await,
            Err(SandboxError::Worker(_))
        ));
    }
    // The threshold is reached; the next attempt is rejected locally.
    assert!(matches!(
        supervisor.execute(params()).await,
        Err(SandboxError::CircuitOpen { .. })
    ));

    supervisor.close().await;
}

#[cfg(unix)]
mod unix {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn write_script(dir: &Path, name: &str, body: &str) {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[tokio::test]
    async fn unsolicited_response_id_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        // Stand-in worker: one response nobody asked for, then correlated
        // echoes for every request.
        write_script(
            dir.path(),
            "worker.sh",
            concat!(
                "#!/bin/sh\n",
                "echo '{\"id\":\"nobody-asked\",\"ok\":true,\"result\":{\"spurious\":true}}'\n",
                "while read line; do\n",
                "  id=$(printf '%s' \"$line\" | sed -n 's/.*\"id\":\"\\([^\"]*\\)\".*/\\1/p')\n",
                "  printf '{\"id\":\"%s\",\"ok\":true,\"result\":{\"status\":\"ok\"}}\\n' \"$id\"\n",
                "done\n",
            ),
        );
        let supervisor = SandboxSupervisor::spawn_with_program(
            &SandboxConfig::default(),
            &dir.path().join("worker.sh"),
        )
        .unwrap();

        // Calls before and after the spurious frame settle normally.
        assert_eq!(supervisor.healthcheck().await.unwrap()["status"], "ok");
        assert_eq!(supervisor.healthcheck().await.unwrap()["status"], "ok");
        assert!(supervisor.is_running().await);

        supervisor.close().await;
    }

    #[tokio::test]
    async fn close_rejects_calls_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        // Stand-in worker that swallows every request without answering.
        write_script(
            dir.path(),
            "worker.sh",
            "#!/bin/sh\nwhile read line; do :; done\n",
        );
        let supervisor = std::sync::Arc::new(
            SandboxSupervisor::spawn_with_program(
                &SandboxConfig::default(),
                &dir.path().join("worker.sh"),
            )
            .unwrap(),
        );

        let in_flight = {
            let supervisor = std::sync::Arc::clone(&supervisor);
            tokio::spawn(async move { supervisor.healthcheck().await })
        };
        // Let the request reach the worker before closing.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        supervisor.close().await;

        assert!(matches!(
            in_flight.await.unwrap(),
            Err(SandboxError::Closed)
        ));
    }

    #[tokio::test]
    async fn execute_round_trips_through_a_real_skill() {
        let dir = tempfile::tempdir().unwrap();
        write_script(
            dir.path(),
            "main",
            "#!/bin/sh\nread line\necho '{\"answered\":true}'\n",
        );
        let supervisor = spawn_supervisor(&SandboxConfig::default());

        let result = supervisor
            .execute(ExecuteParams {
                skill_path: dir.path().to_path_buf(),
                entrypoint: None,
                command: None,
                payload: Some(json!({"question": 42})),
            })
            .await
            .unwrap();
        assert_eq!(result["answered"], true);

        supervisor.close().await;
    }

    #[tokio::test]
    async fn call_timeout_abandons_the_call_but_not_the_worker() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "main", "#!/bin/sh\nsleep 30\n");
        let config = SandboxConfig {
            entry_timeout_ms: 100,
            ..SandboxConfig::default()
        };
        let supervisor = spawn_supervisor(&config);

        let err = supervisor
            .execute(ExecuteParams {
                skill_path: dir.path().to_path_buf(),
                entrypoint: None,
                command: None,
                payload: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::CallTimeout(_)));

        // The worker itself keeps serving.
        assert!(supervisor.is_running().await);
        supervisor.close().await;
    }
}

mod cli {
    use assert_cmd::Command;
    use predicates::prelude::*;

    #[test]
    fn install_of_unknown_skill_fails_with_registry_error() {
        let root = tempfile::tempdir().unwrap();
        Command::cargo_bin("skillgate")
            .unwrap()
            .env("SKILLGATE_REGISTRY_ROOT", root.path().join("registry"))
            .env("SKILLGATE_INSTALL_ROOT", root.path().join("skills"))
            .args(["install", "nosuch@1.0.0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("nosuch"));
    }

    #[test]
    fn help_lists_the_subcommands() {
        Command::cargo_bin("skillgate")
            .unwrap()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("install"))
            .stdout(predicate::str::contains("exec"))
            .stdout(predicate::str::contains("healthcheck"));
    }
}
