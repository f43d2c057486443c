//! Structured install audit trail.
//!
//! Diagnostic events go through `tracing` under the `audit` target; install
//! attempts are additionally appended to `.install-audit.jsonl` at the
//! install root, one JSON object per attempt, under an exclusive file lock.
//! Failure paths append their line before the error is returned, so the
//! trail is never incomplete.

use crate::core::constants::artifacts;
use crate::utils::time;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// One line of the append-only install audit file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallAttempt {
    pub timestamp: String,
    pub event: String,
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computed_checksum: Option<String>,
    pub checksum_verified: bool,
    pub signature_verified: bool,
    pub require_checksum: bool,
    pub require_signature: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_fallback_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub requested_by: String,
}

pub struct AuditLog {
    install_root: PathBuf,
}

impl AuditLog {
    pub fn new(install_root: &Path) -> Self {
        Self {
            install_root: install_root.to_path_buf(),
        }
    }

    /// Emits a structured diagnostic event under the `audit` target.
    pub fn event(&self, name: &str, fields: serde_json::Value) {
        info!(target: "audit", event = name, fields = %fields, "audit");
    }

    /// Appends one attempt record to the audit file and mirrors it to the
    /// structured log. The file is opened append-only and locked for the
    /// duration of the write.
    pub fn append_attempt(&self, attempt: &InstallAttempt) -> std::io::Result<()> {
        let line = serde_json::to_string(attempt)?;
        info!(target: "audit", event = %attempt.event, record = %line, "install attempt");

        std::fs::create_dir_all(&self.install_root)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.install_root.join(artifacts::AUDIT_FILE))?;
        file.lock_exclusive()?;
        let result = writeln!(&file, "{}", line);
        let _ = fs2::FileExt::unlock(&file);
        result
    }
}

impl InstallAttempt {
    /// A record with everything unverified; steps fill fields in as the
    /// install progresses.
    pub fn started(name: &str, version: &str, requested_by: &str) -> Self {
        Self {
            timestamp: time::now_rfc3339(),
            event: "install_attempt".to_string(),
            name: name.to_string(),
            version: version.to_string(),
            source_path: None,
            declared_checksum: None,
            computed_checksum: None,
            checksum_verified: false,
            signature_verified: false,
            require_checksum: false,
            require_signature: false,
            signature_fallback_reason: None,
            error_code: None,
            requested_by: requested_by.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_one_line_per_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path());
        log.append_attempt(&InstallAttempt::started("echo", "1.0.0", "tester"))
            .unwrap();
        log.append_attempt(&InstallAttempt::started("echo", "1.0.1", "tester"))
            .unwrap();

        let contents =
            std::fs::read_to_string(dir.path().join(artifacts::AUDIT_FILE)).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: InstallAttempt = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.name, "echo");
        assert_eq!(first.requested_by, "tester");
    }
}
