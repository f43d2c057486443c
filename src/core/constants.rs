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

//! skillgate constants - Single source of truth for all configuration values.
//!
//! This module centralizes magic numbers, error reason codes, artifact names,
//! and environment variable keys to ensure consistency and maintainability.

/// Machine-readable reason codes carried by install/verify/sandbox errors.
pub mod codes {
    pub const POLICY_DENIED: &str = "POLICY_DENIED";
    pub const INVALID_REFERENCE: &str = "INVALID_REFERENCE";
    pub const PINNED_VERSION_REQUIRED: &str = "PINNED_VERSION_REQUIRED";
    pub const MISSING_CHECKSUM: &str = "MISSING_CHECKSUM";
    pub const CHECKSUM_MISMATCH: &str = "CHECKSUM_MISMATCH";
    pub const UNKNOWN_TRUST_ANCHOR: &str = "UNKNOWN_TRUST_ANCHOR";
    pub const SIGNATURE_MISMATCH: &str = "SIGNATURE_MISMATCH";
    /// Fallback reason recorded when signature enforcement is disabled.
    pub const SIGNATURE_POLICY_DISABLED: &str = "SIGNATURE_POLICY_DISABLED";
    pub const EGRESS_BLOCKED: &str = "EGRESS_BLOCKED";
    pub const COMMAND_BLOCKED: &str = "COMMAND_BLOCKED";
    pub const EXECUTION_TIMEOUT: &str = "EXECUTION_TIMEOUT";
}

/// On-disk artifact names.
pub mod artifacts {
    /// Bundle manifest file name (checksum field excluded from tree hashing).
    pub const MANIFEST_FILE: &str = "manifest.json";
    /// Append-only per-attempt audit log, one JSON object per line,
    /// written at the install root.
    pub const AUDIT_FILE: &str = ".install-audit.jsonl";
    /// Provenance file written inside the installed path.
    pub const PROVENANCE_FILE: &str = "installed-manifest.json";
}

/// Sandbox wire protocol methods.
pub mod methods {
    pub const EXECUTE: &str = "execute";
    pub const HEALTHCHECK: &str = "healthcheck";
}

/// Sandbox timing and execution defaults.
pub mod sandbox {
    /// Default supervisor entry timeout per call.
    pub const DEFAULT_ENTRY_TIMEOUT_MS: u64 = 30_000;
    /// Grace added on top of the entry timeout before a call is abandoned.
    pub const CALL_TIMEOUT_GRACE_MS: u64 = 1_000;
    /// Default skill execution timeout inside the worker.
    pub const DEFAULT_EXEC_TIMEOUT_MS: u64 = 15_000;
    /// Execution timeout floor.
    pub const EXEC_TIMEOUT_FLOOR_MS: u64 = 250;
    /// Command invoked when the caller does not name one.
    pub const DEFAULT_COMMAND: &str = "default";
    /// Conventional entrypoint file name under a skill path.
    pub const DEFAULT_ENTRYPOINT: &str = "main";
    /// Hidden CLI mode that runs the worker loop (re-exec pattern).
    pub const WORKER_MODE: &str = "__worker";
    /// How long close() waits after SIGTERM before escalating to kill.
    pub const TERM_GRACE_MS: u64 = 2_000;
}

/// Circuit breaker defaults.
pub mod breaker {
    pub const DEFAULT_MAX_FAILURES: u32 = 3;
    pub const DEFAULT_BASE_BACKOFF_MS: u64 = 1_000;
    pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;
}

/// Transport limits (DoS protection).
pub mod limits {
    /// Maximum allowed wire frame size (10 MB).
    pub const MAX_FRAME_SIZE_BYTES: u64 = 10 * 1024 * 1024;
}

/// Configuration environment variables.
pub mod config {
    pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
    pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";
    pub const ENV_INSTALL_ROOT: &str = "SKILLGATE_INSTALL_ROOT";
    pub const ENV_REGISTRY_ROOT: &str = "SKILLGATE_REGISTRY_ROOT";
    pub const ENV_REQUESTED_BY: &str = "SKILLGATE_REQUESTED_BY";
    pub const ENV_ALLOWLIST: &str = "SKILLGATE_ALLOWLIST";
    pub const ENV_DENYLIST: &str = "SKILLGATE_DENYLIST";
    pub const ENV_REQUIRE_PINNED: &str = "SKILLGATE_REQUIRE_PINNED";
    pub const ENV_REQUIRE_CHECKSUM: &str = "SKILLGATE_REQUIRE_CHECKSUM";
    pub const ENV_REQUIRE_SIGNATURE: &str = "SKILLGATE_REQUIRE_SIGNATURE";
    pub const ENV_TRUST_ANCHORS: &str = "SKILLGATE_TRUST_ANCHORS";
    pub const ENV_SANDBOX_ENABLED: &str = "SKILLGATE_SANDBOX_ENABLED";
    pub const ENV_ENTRY_TIMEOUT_MS: &str = "SKILLGATE_ENTRY_TIMEOUT_MS";
    pub const ENV_EGRESS_DENY: &str = "SKILLGATE_EGRESS_DENY";
    pub const ENV_EGRESS_ALLOWLIST: &str = "SKILLGATE_EGRESS_ALLOWLIST";
    pub const ENV_COMMAND_ALLOWLIST: &str = "SKILLGATE_COMMAND_ALLOWLIST";
    pub const ENV_EXEC_TIMEOUT_MS: &str = "SKILLGATE_EXEC_TIMEOUT_MS";
}
