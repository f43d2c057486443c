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

//! Error taxonomy.
//!
//! Every fatal install condition carries a distinct machine-readable reason
//! code so audit records and wire errors stay stable across refactors.

use crate::core::constants::codes;
use thiserror::Error;

/// Authenticity verification failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("signature key id '{0}' does not match any configured trust anchor")]
    UnknownTrustAnchor(String),
    #[error("manifest signature does not match the recomputed digest for key id '{0}'")]
    SignatureMismatch(String),
}

impl VerifyError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownTrustAnchor(_) => codes::UNKNOWN_TRUST_ANCHOR,
            Self::SignatureMismatch(_) => codes::SIGNATURE_MISMATCH,
        }
    }
}

/// Fatal install failures. Raised before any destructive filesystem
/// operation: a rejected install never partially mutates the install root.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("skill '{identity}' is denied by policy: {reason}")]
    PolicyDenied { identity: String, reason: String },

    #[error("invalid skill reference '{0}'")]
    InvalidReference(String),

    #[error("reference '{0}' must be pinned to an explicit version")]
    PinnedVersionRequired(String),

    #[error("manifest for '{0}' declares no checksum but checksum enforcement is on")]
    MissingChecksum(String),

    #[error("checksum mismatch for '{identity}': declared {declared}, computed {computed}")]
    ChecksumMismatch {
        identity: String,
        declared: String,
        computed: String,
    },

    #[error("signature verification failed for '{identity}'")]
    SignatureRejected {
        identity: String,
        #[source]
        source: VerifyError,
    },

    #[error("registry failed to resolve '{reference}': {message}")]
    Registry { reference: String, message: String },

    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl InstallError {
    /// Stable reason code for audit records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PolicyDenied { .. } => codes::POLICY_DENIED,
            Self::InvalidReference(_) => codes::INVALID_REFERENCE,
            Self::PinnedVersionRequired(_) => codes::PINNED_VERSION_REQUIRED,
            Self::MissingChecksum(_) => codes::MISSING_CHECKSUM,
            Self::ChecksumMismatch { .. } => codes::CHECKSUM_MISMATCH,
            Self::SignatureRejected { source, .. } => source.code(),
            Self::Registry { .. } => "REGISTRY_ERROR",
            Self::Manifest(_) => "MANIFEST_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }
}

/// Egress capability rejections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EgressError {
    #[error("egress blocked: host '{0}' is not on the allowlist")]
    Blocked(String),
    #[error("egress blocked: cannot determine target host")]
    UnresolvableHost,
}

/// Host-side sandbox faults.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("sandbox is closed")]
    Closed,

    #[error("sandbox call timed out after {0} ms")]
    CallTimeout(u64),

    #[error("circuit open for skill '{skill}', retry after {retry_at}")]
    CircuitOpen { skill: String, retry_at: String },

    #[error("failed to spawn sandbox worker: {0}")]
    Spawn(String),

    #[error("sandbox worker reported: {0}")]
    Worker(String),

    #[error("sandbox protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
