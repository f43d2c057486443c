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

//! Sandbox worker loop.
//!
//! Reads newline-terminated JSON requests on stdin and answers every frame,
//! malformed ones included, with exactly one JSON line on stdout. Skill
//! entrypoints run as separate OS processes: one request line on the
//! skill's stdin, one result line from its stdout, raced against the
//! execution timeout. On timeout the skill process is killed.

use crate::config::SandboxConfig;
use crate::core::constants::{artifacts, codes, config as keys, limits, methods, sandbox};
use crate::core::models::{ExecuteParams, SkillManifest, WireRequest, WireResponse};
use crate::sandbox::egress::EgressGuard;
use anyhow::Context;
use serde_json::{json, Value};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error};

pub struct Worker {
    config: SandboxConfig,
    egress: Option<EgressGuard>,
}

/// Worker process entry point. Returns the process exit code; an
/// unrecoverable failure emits one final fatal frame first.
pub async fn run() -> i32 {
    let worker = Worker::new(SandboxConfig::from_env());
    match worker.serve().await {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "worker loop failed");
            let fatal = WireResponse::failure(Value::Null, format!("fatal: {e}"));
            if let Ok(line) = serde_json::to_string(&fatal) {
                println!("{line}");
            }
            1
        }
    }
}

impl Worker {
    pub fn new(config: SandboxConfig) -> Self {
        // Fail-closed: the deny flag with an empty allowlist blocks all hosts.
        let egress = config
            .egress_deny
            .then(|| EgressGuard::new(&config.egress_allowlist));
        Self { config, egress }
    }

    /// Request loop over the standard streams. Bounded reads, one response
    /// per inbound line.
    pub async fn serve(&self) -> anyhow::Result<()> {
        let mut reader = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let n = reader.read_until(b'\n', &mut buf).await?;
            if n == 0 {
                debug!("host closed stdin, worker exiting");
                return Ok(());
            }
            if n as u64 > limits::MAX_FRAME_SIZE_BYTES {
                anyhow::bail!(
                    "request frame exceeded size limit of {} bytes",
                    limits::MAX_FRAME_SIZE_BYTES
                );
            }
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let response = self.handle_line(line).await;
            let mut out = serde_json::to_vec(&response).context("serialize response")?;
            out.push(b'\n');
            stdout.write_all(&out).await?;
            stdout.flush().await?;
        }
    }

    async fn handle_line(&self, line: &str) -> WireResponse {
        let request: WireRequest = match serde_json::from_str(line) {
            Ok(req) => req,
            Err(e) => {
                return WireResponse::failure(Value::Null, format!("malformed request frame: {e}"))
            }
        };

        match request.method.as_str() {
            methods::HEALTHCHECK => WireResponse::success(
                request.id,
                json!({ "status": "ok", "pid": std::process::id() }),
            ),
            methods::EXECUTE => match request.params {
                Some(params) => self.handle_execute(request.id, params).await,
                None => WireResponse::failure(request.id, "execute requires params"),
            },
            other => WireResponse::failure(request.id, format!("unknown method '{other}'")),
        }
    }

    async fn handle_execute(&self, id: Value, params: Value) -> WireResponse {
        let params: ExecuteParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return WireResponse::failure(id, format!("invalid execute params: {e}")),
        };

        let command = params
            .command
            .clone()
            .unwrap_or_else(|| sandbox::DEFAULT_COMMAND.to_string());

        // Command policy gates before any skill code runs.
        let allowlist = &self.config.command_allowlist;
        if !allowlist.is_empty() && !allowlist.iter().any(|c| *c == command) {
            return WireResponse::failure(
                id,
                format!("{}: command '{}' is not allowed", codes::COMMAND_BLOCKED, command),
            );
        }

        let manifest = read_manifest(&params.skill_path);

        // Egress policy gates before any skill code runs: every host the
        // skill declares must pass the guard.
        if let Some(guard) = &self.egress {
            if let Some(manifest) = &manifest {
                for host in &manifest.permissions.allowed_egress_hosts {
                    if let Err(e) = guard.check_host(host) {
                        return WireResponse::failure(
                            id,
                            format!("{}: {}", codes::EGRESS_BLOCKED, e),
                        );
                    }
                }
            }
        }

        let entrypoint = params
            .entrypoint
            .clone()
            .or_else(|| manifest.as_ref().and_then(|m| m.entrypoint.clone()))
            .unwrap_or_else(|| sandbox::DEFAULT_ENTRYPOINT.to_string());
        let entry_path = params.skill_path.join(&entrypoint);
        if !entry_path.is_file() {
            return WireResponse::failure(
                id,
                format!("entrypoint '{}' not found under skill path", entrypoint),
            );
        }

        let allowed_hosts = self.context_hosts(manifest.as_ref());
        match self
            .run_entrypoint(&entry_path, &params, &command, &allowed_hosts)
            .await
        {
            Ok(result) => WireResponse::success(id, result),
            Err(e) => WireResponse::failure(id, e.to_string()),
        }
    }

    /// Hosts exposed to the skill as its egress context. Under deny the
    /// policy allowlist wins; otherwise the manifest's declarations pass
    /// through.
    fn context_hosts(&self, manifest: Option<&SkillManifest>) -> Vec<String> {
        if self.config.egress_deny {
            self.config.egress_allowlist.clone()
        } else {
            manifest
                .map(|m| m.permissions.allowed_egress_hosts.clone())
                .unwrap_or_default()
        }
    }

    async fn run_entrypoint(
        &self,
        entry_path: &Path,
        params: &ExecuteParams,
        command: &str,
        allowed_hosts: &[String],
    ) -> anyhow::Result<Value> {
        let mut child = Command::new(entry_path)
            .current_dir(&params.skill_path)
            .env(keys::ENV_EGRESS_DENY, self.config.egress_deny.to_string())
            .env(keys::ENV_EGRESS_ALLOWLIST, allowed_hosts.join(","))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to spawn entrypoint {}", entry_path.display()))?;

        let request = json!({
            "command": command,
            "payload": params.payload.clone().unwrap_or(Value::Null),
            "context": { "allowedEgressHosts": allowed_hosts },
        });

        let timeout_ms = self
            .config
            .exec_timeout_ms
            .max(sandbox::EXEC_TIMEOUT_FLOOR_MS);

        let exchange = async {
            let mut stdin = child
                .stdin
                .take()
                .context("entrypoint stdin not piped")?;
            let mut line = serde_json::to_vec(&request)?;
            line.push(b'\n');
            stdin.write_all(&line).await?;
            stdin.shutdown().await?;
            drop(stdin);

            let stdout = child
                .stdout
                .take()
                .context("entrypoint stdout not piped")?;
            let mut reader = BufReader::new(stdout);
            let mut out = String::new();
            reader.read_line(&mut out).await?;
            let status = child.wait().await?;
            anyhow::Ok((out, status))
        };

        match tokio::time::timeout(Duration::from_millis(timeout_ms), exchange).await {
            Ok(Ok((out, status))) => {
                if !status.success() {
                    anyhow::bail!("skill exited with status {status}");
                }
                let out = out.trim();
                if out.is_empty() {
                    anyhow::bail!("skill produced no result");
                }
                serde_json::from_str(out).context("skill result is not valid JSON")
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                let _ = child.kill().await;
                anyhow::bail!(
                    "{}: execution timed out after {} ms",
                    codes::EXECUTION_TIMEOUT,
                    timeout_ms
                );
            }
        }
    }
}

fn read_manifest(skill_path: &Path) -> Option<SkillManifest> {
    let raw = std::fs::read(skill_path.join(artifacts::MANIFEST_FILE)).ok()?;
    serde_json::from_slice(&raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(config: SandboxConfig) -> Worker {
        Worker::new(config)
    }

    #[tokio::test]
    async fn malformed_frame_gets_null_id_failure() {
        let w = worker(SandboxConfig::default());
        let resp = w.handle_line("this is not json").await;
        assert!(!resp.ok);
        assert_eq!(resp.id, Value::Null);
        assert!(resp.error.unwrap().contains("malformed"));
    }

    #[tokio::test]
    async fn healthcheck_replies_immediately() {
        let w = worker(SandboxConfig::default());
        let resp = w
            .handle_line(r#"{"id":"h1","method":"healthcheck"}"#)
            .await;
        assert!(resp.ok);
        assert_eq!(resp.id, Value::String("h1".to_string()));
        assert_eq!(resp.result.unwrap()["status"], "ok");
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let w = worker(SandboxConfig::default());
        let resp = w.handle_line(r#"{"id":"x","method":"reboot"}"#).await;
        assert!(!resp.ok);
        assert!(resp.error.unwrap().contains("unknown method"));
    }

    #[tokio::test]
    async fn command_allowlist_blocks_before_execution() {
        let config = SandboxConfig {
            command_allowlist: vec!["default".to_string()],
            ..SandboxConfig::default()
        };
        let w = worker(config);
        let resp = w
            .handle_line(
                r#"{"id":"c1","method":"execute","params":{"skillPath":"/nonexistent","command":"drop-tables"}}"#,
            )
            .await;
        assert!(!resp.ok);
        assert!(resp.error.unwrap().contains(codes::COMMAND_BLOCKED));
    }

    #[tokio::test]
    async fn declared_egress_host_outside_policy_is_blocked() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("manifest.json"),
            r#"{"name":"leaky","version":"1.0.0","permissions":{"allowedEgressHosts":["evil.example.com"]}}"#,
        )
        .unwrap();
        let config = SandboxConfig {
            egress_deny: true,
            egress_allowlist: vec!["api.example.com".to_string()],
            ..SandboxConfig::default()
        };
        let w = worker(config);
        let req = json!({
            "id": "e1",
            "method": "execute",
            "params": { "skillPath": dir.path() },
        });
        let resp = w.handle_line(&req.to_string()).await;
        assert!(!resp.ok);
        assert!(resp.error.unwrap().contains(codes::EGRESS_BLOCKED));
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
        async fn execute_runs_entrypoint_and_returns_result() {
            let dir = tempfile::tempdir().unwrap();
            write_script(
                dir.path(),
                "main",
                "#!/bin/sh\nread line\necho '{\"echoed\":true}'\n",
            );
            let w = worker(SandboxConfig::default());
            let req = json!({
                "id": "r1",
                "method": "execute",
                "params": { "skillPath": dir.path(), "payload": {"q": 1} },
            });
            let resp = w.handle_line(&req.to_string()).await;
            assert!(resp.ok, "unexpected error: {:?}", resp.error);
            assert_eq!(resp.result.unwrap()["echoed"], true);
        }

        #[tokio::test]
        async fn execution_timeout_kills_the_skill() {
            let dir = tempfile::tempdir().unwrap();
            write_script(dir.path(), "main", "#!/bin/sh\nsleep 60\n");
            let config = SandboxConfig {
                exec_timeout_ms: 300,
                ..SandboxConfig::default()
            };
            let w = worker(config);
            let req = json!({
                "id": "t1",
                "method": "execute",
                "params": { "skillPath": dir.path() },
            });
            let resp = w.handle_line(&req.to_string()).await;
            assert!(!resp.ok);
            assert!(resp.error.unwrap().contains(codes::EXECUTION_TIMEOUT));
        }

        #[tokio::test]
        async fn missing_entrypoint_is_reported() {
            let dir = tempfile::tempdir().unwrap();
            let w = worker(SandboxConfig::default());
            let req = json!({
                "id": "m1",
                "method": "execute",
                "params": { "skillPath": dir.path() },
            });
            let resp = w.handle_line(&req.to_string()).await;
            assert!(!resp.ok);
            assert!(resp.error.unwrap().contains("entrypoint"));
        }
    }
}
