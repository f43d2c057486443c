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

//! Skill installer.
//!
//! Orchestrates reference resolution, policy decision, checksum and
//! signature enforcement, versioned bundle placement, and the audit trail.
//! Every fatal condition is raised before any destructive filesystem
//! operation: a rejected install never partially mutates the install root.
//! Placement itself is last-writer-wins per destination path, not
//! transactional across a process crash mid-copy.

pub mod policy;
pub mod registry;

use crate::core::audit::{AuditLog, InstallAttempt};
use crate::core::checksum::checksum_directory_tree;
use crate::core::constants::{artifacts, codes};
use crate::core::errors::InstallError;
use crate::core::models::{InstallPlan, InstallRecord, SkillBundle, SkillReference};
use crate::core::trust::{TrustAnchorMap, TrustVerifier};
use crate::utils::time;
use policy::PolicyDecision;
use registry::SkillRegistry;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct Installer<R: SkillRegistry> {
    install_root: PathBuf,
    registry: R,
    verifier: TrustVerifier,
    audit: AuditLog,
}

impl<R: SkillRegistry> Installer<R> {
    pub fn new(install_root: impl Into<PathBuf>, registry: R, anchors: TrustAnchorMap) -> Self {
        let install_root = install_root.into();
        let audit = AuditLog::new(&install_root);
        Self {
            install_root,
            registry,
            verifier: TrustVerifier::new(anchors),
            audit,
        }
    }

    pub async fn install(
        &self,
        raw_reference: &str,
        plan: &InstallPlan,
    ) -> Result<InstallRecord, InstallError> {
        // 1. Resolve the requested reference.
        let reference: SkillReference = raw_reference.parse()?;
        let mut attempt =
            InstallAttempt::started(&reference.name, &reference.version, &plan.requested_by);
        attempt.require_checksum = plan.require_checksum;
        attempt.require_signature = plan.require_signature;

        if plan.require_pinned && !reference.is_pinned() {
            return Err(self.reject(
                attempt,
                InstallError::PinnedVersionRequired(raw_reference.to_string()),
            ));
        }

        // 2. Verification started, with the plan's enforcement flags.
        self.audit.event(
            "install_verification_started",
            json!({
                "identity": reference.identity(),
                "requirePinned": plan.require_pinned,
                "requireChecksum": plan.require_checksum,
                "requireSignature": plan.require_signature,
                "requestedBy": plan.requested_by,
            }),
        );

        // 3. Policy decision, before the registry is consulted.
        if let PolicyDecision::Denied { reason } = policy::evaluate(&reference, plan) {
            self.audit.event(
                "install_denied",
                json!({ "identity": reference.identity(), "reason": reason }),
            );
            return Err(self.reject(
                attempt,
                InstallError::PolicyDenied {
                    identity: reference.identity(),
                    reason,
                },
            ));
        }

        // 4. Bundle resolution.
        let bundle = self.registry.resolve(&reference).await?;
        attempt.name = bundle.manifest.name.clone();
        attempt.version = bundle.manifest.version.clone();
        attempt.source_path = Some(bundle.source_path.display().to_string());

        // 5. Checksum enforcement.
        let computed = checksum_directory_tree(&bundle.source_path)?;
        let declared = bundle.manifest.checksum.clone();
        attempt.declared_checksum = declared.clone();
        attempt.computed_checksum = Some(computed.clone());
        attempt.checksum_verified = declared.as_deref() == Some(computed.as_str());

        if plan.require_checksum {
            let Some(declared) = declared else {
                return Err(self.reject(
                    attempt,
                    InstallError::MissingChecksum(reference.identity()),
                ));
            };
            if declared != computed {
                return Err(self.reject(
                    attempt,
                    InstallError::ChecksumMismatch {
                        identity: reference.identity(),
                        declared,
                        computed,
                    },
                ));
            }
        } else {
            self.audit.event(
                "checksum_enforcement_disabled",
                json!({
                    "identity": reference.identity(),
                    "checksumVerified": attempt.checksum_verified,
                }),
            );
            if declared.is_some() && !attempt.checksum_verified {
                warn!(
                    identity = %reference.identity(),
                    "declared checksum does not match computed digest (advisory only)"
                );
            }
        }

        // 6. Signature enforcement.
        if plan.require_signature {
            if let Err(source) = self.verifier.verify(&bundle.manifest, &bundle.source_path) {
                return Err(self.reject(
                    attempt,
                    InstallError::SignatureRejected {
                        identity: reference.identity(),
                        source,
                    },
                ));
            }
            attempt.signature_verified = true;
        } else {
            attempt.signature_fallback_reason =
                Some(codes::SIGNATURE_POLICY_DISABLED.to_string());
            self.audit.event(
                "signature_enforcement_disabled",
                json!({ "identity": reference.identity() }),
            );
        }

        // 7. Destination placement: last writer wins per (name, version).
        // The destination must be a strict descendant of the install root;
        // a bundle manifest is attacker-supplied input and must not be able
        // to steer the removal below outside its own slot.
        let relative = Path::new(&sanitize_component(&attempt.name))
            .join(sanitize_component(&attempt.version));
        if relative
            .components()
            .any(|c| !matches!(c, std::path::Component::Normal(_)))
        {
            return Err(self.reject(
                attempt,
                InstallError::InvalidReference(reference.identity()),
            ));
        }
        let install_path = self.install_root.join(relative);
        if install_path.exists() {
            std::fs::remove_dir_all(&install_path)?;
        }
        copy_tree(&bundle.source_path, &install_path)?;

        // 8. Audit line and provenance file.
        attempt.event = "install_completed".to_string();
        self.audit.append_attempt(&attempt)?;
        self.write_provenance(&install_path, &attempt, &bundle)?;

        info!(
            identity = %reference.identity(),
            path = %install_path.display(),
            checksum_verified = attempt.checksum_verified,
            signature_verified = attempt.signature_verified,
            "skill installed"
        );

        // 9. The durable record.
        Ok(InstallRecord {
            name: attempt.name,
            version: attempt.version,
            install_path,
            checksum_verified: attempt.checksum_verified,
            signature_verified: attempt.signature_verified,
        })
    }

    /// Appends the failed attempt to the audit trail, then hands the error
    /// back. Audit-before-throw keeps the trail complete on every path.
    fn reject(&self, mut attempt: InstallAttempt, error: InstallError) -> InstallError {
        attempt.event = "install_rejected".to_string();
        attempt.error_code = Some(error.code().to_string());
        if let Err(io) = self.audit.append_attempt(&attempt) {
            warn!(error = %io, "failed to append install audit record");
        }
        error
    }

    fn write_provenance(
        &self,
        install_path: &Path,
        attempt: &InstallAttempt,
        bundle: &SkillBundle,
    ) -> Result<(), InstallError> {
        let provenance = json!({
            "installedAt": time::now_rfc3339(),
            "name": attempt.name,
            "version": attempt.version,
            "entrypoint": bundle.manifest.entrypoint,
            "requestedBy": attempt.requested_by,
        });
        std::fs::write(
            install_path.join(artifacts::PROVENANCE_FILE),
            serde_json::to_vec_pretty(&provenance)?,
        )?;
        Ok(())
    }
}

/// Maps a name or version string onto a single filesystem-safe path
/// component. Letters, digits, `.`, `_`, and `-` pass through; anything
/// else becomes `-`. An empty or dots-only result (`.`, `..`, `...`) would
/// escape or alias the destination directory, so it collapses to `-`.
pub fn sanitize_component(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if mapped.is_empty() || mapped.chars().all(|c| c == '.') {
        "-".to_string()
    } else {
        mapped
    }
}

fn copy_tree(source: &Path, dest: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_passes_safe_characters() {
        assert_eq!(sanitize_component("1.2.0-rc_1"), "1.2.0-rc_1");
    }

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_component("1.0/..\\evil"), "1.0-..-evil");
        assert_eq!(sanitize_component("a b@c"), "a-b-c");
    }

    #[test]
    fn sanitize_collapses_traversal_components() {
        assert_eq!(sanitize_component(".."), "-");
        assert_eq!(sanitize_component("."), "-");
        assert_eq!(sanitize_component("..."), "-");
        assert_eq!(sanitize_component(""), "-");
        // Dots mixed with regular characters stay a single safe component.
        assert_eq!(sanitize_component("..1"), "..1");
    }
}
