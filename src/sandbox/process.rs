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

//! Worker process management with strict parent-child binding.
//!
//! On Linux the worker gets `PR_SET_PDEATHSIG(SIGKILL)` so it cannot
//! outlive a crashed host. Termination is graceful first (SIGTERM on unix),
//! escalating to a hard kill through the kill channel.

use crate::core::errors::SandboxError;
use crate::sandbox::supervisor::WorkerEvent;
use std::process::Stdio;
use tokio::process::{ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

pub struct WorkerProcess {
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    exited_rx: watch::Receiver<bool>,
}

pub type WorkerSpawn = (WorkerProcess, ChildStdin, ChildStdout, ChildStderr);

impl WorkerProcess {
    /// Spawns the worker with all three standard streams piped. The exit
    /// status is forwarded to `tx_events` when the process terminates.
    pub fn spawn(
        mut command: Command,
        tx_events: mpsc::Sender<WorkerEvent>,
    ) -> Result<WorkerSpawn, SandboxError> {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(target_os = "linux")]
        // SAFETY: PR_SET_PDEATHSIG with SIGKILL is the standard Linux
        // mechanism to bind a child's lifetime to its parent. The constants
        // come from libc and are valid on this platform.
        unsafe {
            command.pre_exec(|| {
                let ret = libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL);
                if ret != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = command
            .spawn()
            .map_err(|e| SandboxError::Spawn(e.to_string()))?;
        let pid = child.id();
        debug!(pid, "sandbox worker spawned");

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SandboxError::Spawn("worker stdin not piped".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SandboxError::Spawn("worker stdout not piped".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SandboxError::Spawn("worker stderr not piped".to_string()))?;

        let (kill_tx, kill_rx) = oneshot::channel();
        let (exited_tx, exited_rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::select! {
                _ = kill_rx => {
                    let _ = child.kill().await;
                    let _ = tx_events.send(WorkerEvent::Terminated(None)).await;
                }
                status = child.wait() => {
                    let code = status.ok().and_then(|s| s.code());
                    let _ = tx_events.send(WorkerEvent::Terminated(code)).await;
                }
            }
            let _ = exited_tx.send(true);
        });

        Ok((
            Self {
                pid,
                kill_tx: Some(kill_tx),
                exited_rx,
            },
            stdin,
            stdout,
            stderr,
        ))
    }

    pub fn is_running(&self) -> bool {
        !*self.exited_rx.borrow()
    }

    /// Asks the worker to exit gracefully. Unix only; other platforms go
    /// straight to `kill`.
    pub fn terminate(&mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            let _ = nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(pid as i32),
                nix::sys::signal::Signal::SIGTERM,
            );
            return;
        }
        self.kill();
    }

    /// Hard kill through the supervision task.
    pub fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Resolves once the process has exited.
    pub async fn wait_exited(&mut self) {
        if *self.exited_rx.borrow() {
            return;
        }
        // wait_for only errs if the sender is dropped, which also means the
        // supervision task (and the child) is gone.
        let _ = self.exited_rx.wait_for(|exited| *exited).await;
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        self.kill();
    }
}
