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

//! Environment-driven configuration. Keys live in `core::constants::config`.

use crate::core::constants::{config as keys, sandbox};
use crate::core::models::InstallPlan;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

fn env_bool(key: &str) -> bool {
    env::var(key)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
}

fn env_list(key: &str) -> Vec<String> {
    env::var(key)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Sandbox policy, passed from supervisor to worker through the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub enabled: bool,
    pub entry_timeout_ms: u64,
    pub egress_deny: bool,
    pub egress_allowlist: Vec<String>,
    pub command_allowlist: Vec<String>,
    pub exec_timeout_ms: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            entry_timeout_ms: sandbox::DEFAULT_ENTRY_TIMEOUT_MS,
            egress_deny: false,
            egress_allowlist: Vec::new(),
            command_allowlist: Vec::new(),
            exec_timeout_ms: sandbox::DEFAULT_EXEC_TIMEOUT_MS,
        }
    }
}

impl SandboxConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: env::var(keys::ENV_SANDBOX_ENABLED)
                .map(|v| !(v.eq_ignore_ascii_case("false") || v == "0"))
                .unwrap_or(true),
            entry_timeout_ms: env_u64(
                keys::ENV_ENTRY_TIMEOUT_MS,
                sandbox::DEFAULT_ENTRY_TIMEOUT_MS,
            ),
            egress_deny: env_bool(keys::ENV_EGRESS_DENY),
            egress_allowlist: env_list(keys::ENV_EGRESS_ALLOWLIST),
            command_allowlist: env_list(keys::ENV_COMMAND_ALLOWLIST),
            exec_timeout_ms: env_u64(keys::ENV_EXEC_TIMEOUT_MS, sandbox::DEFAULT_EXEC_TIMEOUT_MS),
        }
    }

    /// The environment the supervisor exports to the worker process.
    pub fn to_env(&self) -> Vec<(String, String)> {
        vec![
            (
                keys::ENV_ENTRY_TIMEOUT_MS.to_string(),
                self.entry_timeout_ms.to_string(),
            ),
            (
                keys::ENV_EGRESS_DENY.to_string(),
                self.egress_deny.to_string(),
            ),
            (
                keys::ENV_EGRESS_ALLOWLIST.to_string(),
                self.egress_allowlist.join(","),
            ),
            (
                keys::ENV_COMMAND_ALLOWLIST.to_string(),
                self.command_allowlist.join(","),
            ),
            (
                keys::ENV_EXEC_TIMEOUT_MS.to_string(),
                self.exec_timeout_ms.to_string(),
            ),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_format: String, // "json" or "text"
    pub install_root: PathBuf,
    pub registry_root: PathBuf,
    pub trust_anchors_raw: Option<String>,
    pub plan: InstallPlan,
    pub sandbox: SandboxConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            log_level: env::var(keys::ENV_LOG_LEVEL).unwrap_or_else(|_| "info".to_string()),
            log_format: env::var(keys::ENV_LOG_FORMAT).unwrap_or_else(|_| "text".to_string()),
            install_root: env::var(keys::ENV_INSTALL_ROOT)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("skills")),
            registry_root: env::var(keys::ENV_REGISTRY_ROOT)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("registry")),
            trust_anchors_raw: env::var(keys::ENV_TRUST_ANCHORS).ok(),
            plan: InstallPlan {
                requested_by: env::var(keys::ENV_REQUESTED_BY)
                    .unwrap_or_else(|_| "unknown".to_string()),
                allowlist: env_list(keys::ENV_ALLOWLIST),
                denylist: env_list(keys::ENV_DENYLIST),
                require_pinned: env_bool(keys::ENV_REQUIRE_PINNED),
                require_checksum: env_bool(keys::ENV_REQUIRE_CHECKSUM),
                require_signature: env_bool(keys::ENV_REQUIRE_SIGNATURE),
            },
            sandbox: SandboxConfig::from_env(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            install_root: PathBuf::from("skills"),
            registry_root: PathBuf::from("registry"),
            trust_anchors_raw: None,
            plan: InstallPlan::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}
