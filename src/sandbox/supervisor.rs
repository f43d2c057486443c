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

//! Host-side sandbox supervisor.
//!
//! Owns exactly one worker process and the exclusive use of its standard
//! streams. Calls are correlated by a per-call UUID in an owned pending
//! table; there is no ordering guarantee beyond correlation by id. A
//! per-call timeout abandons interest locally; only `close()` terminates
//! the worker. Process faults are logged and surfaced to in-flight calls
//! only; the caller recreates the supervisor.

use crate::config::SandboxConfig;
use crate::core::breaker::CircuitBreaker;
use crate::core::constants::{breaker, methods, sandbox};
use crate::core::errors::SandboxError;
use chrono::Utc;
use crate::core::models::{ExecuteParams, WireRequest, WireResponse};
use crate::sandbox::codec::FrameCodec;
use crate::sandbox::process::WorkerProcess;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Events flowing from the worker's streams and lifecycle.
#[derive(Debug)]
pub enum WorkerEvent {
    Response(WireResponse),
    /// Unstructured log line from worker stderr.
    Log(String),
    /// Worker terminated with optional exit code.
    Terminated(Option<i32>),
}

type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<Result<Value, SandboxError>>>>>;

pub struct SandboxSupervisor {
    entry_timeout_ms: u64,
    pending: Pending,
    closed: Arc<AtomicBool>,
    writer: tokio::sync::Mutex<FramedWrite<ChildStdin, FrameCodec>>,
    worker: tokio::sync::Mutex<WorkerProcess>,
    /// One breaker per skill path; timeouts and worker faults trip it so
    /// retries against a failing skill back off instead of hammering it.
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
}

impl SandboxSupervisor {
    /// Spawns a supervisor running this executable in worker mode, or
    /// `None` when the sandbox is disabled by configuration.
    pub fn spawn(config: &SandboxConfig) -> Result<Option<Self>, SandboxError> {
        if !config.enabled {
            return Ok(None);
        }
        let exe = std::env::current_exe().map_err(|e| SandboxError::Spawn(e.to_string()))?;
        Self::spawn_with_program(config, &exe).map(Some)
    }

    /// Spawns against an explicit worker binary. Policy travels through the
    /// worker's environment.
    pub fn spawn_with_program(
        config: &SandboxConfig,
        program: &Path,
    ) -> Result<Self, SandboxError> {
        let mut command = Command::new(program);
        command.arg(sandbox::WORKER_MODE);
        for (key, value) in config.to_env() {
            command.env(key, value);
        }

        let (tx_events, rx_events) = mpsc::channel(64);
        let (worker, stdin, stdout, stderr) = WorkerProcess::spawn(command, tx_events.clone())?;

        spawn_response_reader(stdout, tx_events.clone());
        spawn_stderr_drain(stderr, tx_events);

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        spawn_dispatcher(rx_events, Arc::clone(&pending), Arc::clone(&closed));

        Ok(Self {
            entry_timeout_ms: config.entry_timeout_ms,
            pending,
            closed,
            writer: tokio::sync::Mutex::new(FramedWrite::new(stdin, FrameCodec::new())),
            worker: tokio::sync::Mutex::new(worker),
            breakers: Mutex::new(HashMap::new()),
        })
    }

    /// Invokes a skill in the worker. Repeated timeouts or worker faults
    /// for the same skill path open its breaker, and further attempts are
    /// rejected until the cooldown elapses.
    pub async fn execute(&self, params: ExecuteParams) -> Result<Value, SandboxError> {
        let skill = params.skill_path.display().to_string();
        {
            let mut breakers = self.breakers.lock().expect("breaker table poisoned");
            let breaker = breakers.entry(skill.clone()).or_insert_with(|| {
                CircuitBreaker::new(
                    breaker::DEFAULT_MAX_FAILURES,
                    breaker::DEFAULT_BASE_BACKOFF_MS,
                    breaker::DEFAULT_MAX_BACKOFF_MS,
                )
            });
            if !breaker.can_attempt(Utc::now()) {
                let retry_at = breaker
                    .next_retry_at()
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default();
                return Err(SandboxError::CircuitOpen { skill, retry_at });
            }
        }

        let params =
            serde_json::to_value(params).map_err(|e| SandboxError::Protocol(e.to_string()))?;
        let outcome = self.call(methods::EXECUTE, Some(params)).await;

        let mut breakers = self.breakers.lock().expect("breaker table poisoned");
        if let Some(breaker) = breakers.get_mut(&skill) {
            match &outcome {
                Ok(_) => breaker.record_success(),
                Err(SandboxError::CallTimeout(_) | SandboxError::Worker(_)) => {
                    breaker.record_failure(Utc::now());
                    warn!(skill = %skill, state = ?breaker.state(), "skill call failed");
                }
                Err(_) => {}
            }
        }
        outcome
    }

    /// Liveness probe.
    pub async fn healthcheck(&self) -> Result<Value, SandboxError> {
        self.call(methods::HEALTHCHECK, None).await
    }

    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, SandboxError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SandboxError::Closed);
        }

        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending table poisoned")
            .insert(id.clone(), tx);

        let request = WireRequest {
            id: Value::String(id.clone()),
            method: method.to_string(),
            params,
        };

        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.send(&request).await {
                self.remove_pending(&id);
                return Err(SandboxError::Protocol(format!(
                    "failed to write request frame: {e}"
                )));
            }
        }

        // Entry timeout plus grace; expiry abandons interest locally and
        // does not cancel the worker-side computation.
        let deadline_ms = self.entry_timeout_ms + sandbox::CALL_TIMEOUT_GRACE_MS;
        match tokio::time::timeout(Duration::from_millis(deadline_ms), rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(SandboxError::Closed),
            Err(_) => {
                self.remove_pending(&id);
                Err(SandboxError::CallTimeout(deadline_ms))
            }
        }
    }

    fn remove_pending(&self, id: &str) {
        self.pending
            .lock()
            .expect("pending table poisoned")
            .remove(id);
    }

    /// True until `close()` has run.
    pub async fn is_running(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.worker.lock().await.is_running()
    }

    /// Rejects every outstanding call, terminates the worker (SIGTERM,
    /// escalating to kill after a grace period), and waits for exit.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let drained: Vec<_> = {
            let mut pending = self.pending.lock().expect("pending table poisoned");
            pending.drain().collect()
        };
        for (_, tx) in drained {
            let _ = tx.send(Err(SandboxError::Closed));
        }

        let mut worker = self.worker.lock().await;
        if worker.is_running() {
            worker.terminate();
            let grace = Duration::from_millis(sandbox::TERM_GRACE_MS);
            if tokio::time::timeout(grace, worker.wait_exited()).await.is_err() {
                warn!("worker ignored SIGTERM, killing");
                worker.kill();
                worker.wait_exited().await;
            }
        }
    }
}

/// Reads response frames from worker stdout. Malformed lines are dropped
/// by the codec; a framing-level error ends the stream.
fn spawn_response_reader<R>(stream: R, tx: mpsc::Sender<WorkerEvent>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut framed = FramedRead::new(stream, FrameCodec::new());
        while let Some(result) = framed.next().await {
            match result {
                Ok(value) => match serde_json::from_value::<WireResponse>(value) {
                    Ok(response) => {
                        if tx.send(WorkerEvent::Response(response)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "dropping response with unexpected shape");
                    }
                },
                Err(e) => {
                    error!(error = %e, "worker stream framing error");
                    break;
                }
            }
        }
    });
}

/// Drains worker stderr into the host log.
fn spawn_stderr_drain<R>(stream: R, tx: mpsc::Sender<WorkerEvent>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let msg = line.trim().to_string();
                    if !msg.is_empty() && tx.send(WorkerEvent::Log(msg)).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
}

/// Settles pending calls from worker events. A response with no matching
/// pending entry is a no-op.
fn spawn_dispatcher(mut rx: mpsc::Receiver<WorkerEvent>, pending: Pending, closed: Arc<AtomicBool>) {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                WorkerEvent::Response(response) => {
                    let key = match &response.id {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    let entry = pending
                        .lock()
                        .expect("pending table poisoned")
                        .remove(&key);
                    match entry {
                        Some(tx) => {
                            let outcome = if response.ok {
                                Ok(response.result.unwrap_or(Value::Null))
                            } else {
                                Err(SandboxError::Worker(
                                    response.error.unwrap_or_else(|| "unknown error".to_string()),
                                ))
                            };
                            let _ = tx.send(outcome);
                        }
                        None => {
                            debug!(id = %key, "ignoring response with no pending call");
                        }
                    }
                }
                WorkerEvent::Log(line) => {
                    debug!(target: "sandbox::worker", "{}", line);
                }
                WorkerEvent::Terminated(code) => {
                    if !closed.load(Ordering::SeqCst) {
                        error!(?code, "sandbox worker exited unexpectedly");
                    }
                    let drained: Vec<_> = {
                        let mut map = pending.lock().expect("pending table poisoned");
                        map.drain().collect()
                    };
                    for (_, tx) in drained {
                        let _ = tx.send(Err(SandboxError::Worker(
                            "worker process exited".to_string(),
                        )));
                    }
                }
            }
        }
    });
}
