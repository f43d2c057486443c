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

//! Domain models for the skill supply chain.
//!
//! Pure data structures representing references, manifests, bundles, install
//! plans, and the sandbox wire frames. Free of I/O side effects. Wire field
//! names keep the original camelCase JSON form via serde renames.

use crate::core::errors::InstallError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// The unpinned version marker.
pub const LATEST: &str = "latest";

/// Identifies a skill by name and version. `version = "latest"` is a valid
/// unpinned reference when pinning is not required.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkillReference {
    pub name: String,
    pub version: String,
}

impl SkillReference {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// True when the reference names an explicit version.
    pub fn is_pinned(&self) -> bool {
        self.version != LATEST
    }

    /// The `name@version` identity string used in policy matching and audit.
    pub fn identity(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

impl FromStr for SkillReference {
    type Err = InstallError;

    /// Parses `name` or `name@version`. An explicit `@` demands a non-empty
    /// version; a bare name defaults to `latest`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('@') {
            Some((name, version)) => {
                if name.is_empty() || version.is_empty() {
                    return Err(InstallError::InvalidReference(s.to_string()));
                }
                Ok(Self::new(name, version))
            }
            None => {
                if s.is_empty() {
                    return Err(InstallError::InvalidReference(s.to_string()));
                }
                Ok(Self::new(s, LATEST))
            }
        }
    }
}

impl std::fmt::Display for SkillReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Permissions a skill declares in its manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillPermissions {
    #[serde(rename = "allowedEgressHosts", default)]
    pub allowed_egress_hosts: Vec<String>,
    #[serde(default)]
    pub commands: Vec<String>,
}

/// A skill bundle's manifest (`manifest.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillManifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub entrypoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(rename = "signatureAlgorithm", skip_serializing_if = "Option::is_none")]
    pub signature_algorithm: Option<String>,
    #[serde(rename = "signatureKeyId", skip_serializing_if = "Option::is_none")]
    pub signature_key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default)]
    pub permissions: SkillPermissions,
}

/// The resolved on-disk bundle, owned transiently during an install.
#[derive(Debug, Clone)]
pub struct SkillBundle {
    pub manifest: SkillManifest,
    pub source_path: PathBuf,
}

/// External install configuration, immutable per install call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallPlan {
    pub requested_by: String,
    #[serde(default)]
    pub allowlist: Vec<String>,
    #[serde(default)]
    pub denylist: Vec<String>,
    #[serde(default)]
    pub require_pinned: bool,
    #[serde(default)]
    pub require_checksum: bool,
    #[serde(default)]
    pub require_signature: bool,
}

/// The durable result of a successful install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRecord {
    pub name: String,
    pub version: String,
    pub install_path: PathBuf,
    pub checksum_verified: bool,
    pub signature_verified: bool,
}

/// One sandbox wire request: a newline-terminated JSON object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireRequest {
    pub id: serde_json::Value,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// One sandbox wire response. Exactly one is emitted per inbound frame,
/// malformed frames included (those carry a null id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireResponse {
    pub id: serde_json::Value,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WireResponse {
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: serde_json::Value, error: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Parameters of the `execute` method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteParams {
    #[serde(rename = "skillPath")]
    pub skill_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_name_as_latest() {
        let r: SkillReference = "web-search".parse().unwrap();
        assert_eq!(r.name, "web-search");
        assert_eq!(r.version, LATEST);
        assert!(!r.is_pinned());
    }

    #[test]
    fn parses_pinned_reference() {
        let r: SkillReference = "web-search@1.2.0".parse().unwrap();
        assert_eq!(r.identity(), "web-search@1.2.0");
        assert!(r.is_pinned());
    }

    #[test]
    fn rejects_empty_name_or_version() {
        assert!("".parse::<SkillReference>().is_err());
        assert!("@1.0".parse::<SkillReference>().is_err());
        assert!("name@".parse::<SkillReference>().is_err());
    }

    #[test]
    fn manifest_roundtrip_keeps_wire_names() {
        let raw = serde_json::json!({
            "name": "echo",
            "version": "1.0.0",
            "description": "echoes",
            "entrypoint": "main",
            "signatureKeyId": "release-1",
            "permissions": {"allowedEgressHosts": ["api.example.com"], "commands": ["default"]}
        });
        let m: SkillManifest = serde_json::from_value(raw).unwrap();
        assert_eq!(m.signature_key_id.as_deref(), Some("release-1"));
        assert_eq!(m.permissions.allowed_egress_hosts, vec!["api.example.com"]);
        let back = serde_json::to_value(&m).unwrap();
        assert!(back.get("signatureKeyId").is_some());
        assert!(back.get("signature_key_id").is_none());
    }
}
