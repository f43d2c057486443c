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

//! Trust anchor verification.
//!
//! Keyed HMAC-SHA256 signatures over a canonical manifest form. The
//! signature-bearing fields (`signature`, `signatureKeyId`,
//! `signatureAlgorithm`) are excluded from the canonical form so
//! verification is not circular. Comparison is constant-time.

use crate::core::errors::{InstallError, VerifyError};
use crate::core::models::SkillManifest;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::path::Path;

type HmacSha256 = Hmac<Sha256>;

/// Named keys used to verify manifest signatures. Configuration only;
/// never persisted alongside manifests.
pub type TrustAnchorMap = HashMap<String, String>;

/// Parses trust anchors from either a JSON object or a comma-separated
/// `key=value` list. Whitespace around keys and values is trimmed.
pub fn parse_trust_anchors(raw: &str) -> Result<TrustAnchorMap, InstallError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(TrustAnchorMap::new());
    }

    if raw.starts_with('{') {
        let parsed: HashMap<String, String> = serde_json::from_str(raw)?;
        return Ok(parsed
            .into_iter()
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect());
    }

    let mut anchors = TrustAnchorMap::new();
    for pair in raw.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            InstallError::InvalidReference(format!("malformed trust anchor entry '{}'", pair))
        })?;
        anchors.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(anchors)
}

/// Serializes the manifest with its signature-related fields and the
/// `checksum` field removed. serde_json's sorted object keys make the form
/// canonical. The checksum must be excluded: it is computed over a tree
/// that already contains the signature, so including it here would make
/// each field an input to the other.
fn canonical_manifest(manifest: &SkillManifest) -> String {
    let mut value = serde_json::to_value(manifest).unwrap_or_default();
    if let Some(obj) = value.as_object_mut() {
        obj.remove("signature");
        obj.remove("signatureKeyId");
        obj.remove("signatureAlgorithm");
        obj.remove("checksum");
    }
    value.to_string()
}

/// Computes the hex HMAC-SHA256 signature of a manifest under `secret`.
pub fn sign_manifest(manifest: &SkillManifest, secret: &str) -> String {
    // HMAC accepts keys of any length, so new_from_slice cannot fail here.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
    mac.update(canonical_manifest(manifest).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies manifest signatures against a configured set of trust anchors.
pub struct TrustVerifier {
    anchors: TrustAnchorMap,
}

impl TrustVerifier {
    pub fn new(anchors: TrustAnchorMap) -> Self {
        Self { anchors }
    }

    /// Verifies `manifest.signature` against the anchor named by
    /// `manifest.signature_key_id`. `source_path` is accepted for forward
    /// extensibility (anchoring to bundle contents); the reference behavior
    /// binds only to the manifest digest.
    pub fn verify(
        &self,
        manifest: &SkillManifest,
        _source_path: &Path,
    ) -> Result<(), VerifyError> {
        let key_id = manifest.signature_key_id.as_deref().unwrap_or("");
        let secret = self
            .anchors
            .get(key_id)
            .ok_or_else(|| VerifyError::UnknownTrustAnchor(key_id.to_string()))?;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| VerifyError::SignatureMismatch(key_id.to_string()))?;
        mac.update(canonical_manifest(manifest).as_bytes());

        let provided = manifest
            .signature
            .as_deref()
            .and_then(|s| hex::decode(s).ok())
            .ok_or_else(|| VerifyError::SignatureMismatch(key_id.to_string()))?;

        mac.verify_slice(&provided)
            .map_err(|_| VerifyError::SignatureMismatch(key_id.to_string()))
    }
}
