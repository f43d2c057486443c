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

//! Registry seam.
//!
//! The installer only consumes the `SkillRegistry` shape; resolution
//! strategy lives behind it. `DirRegistry` is the minimal local
//! implementation backing the CLI and tests.

use crate::core::constants::artifacts;
use crate::core::errors::InstallError;
use crate::core::models::{SkillBundle, SkillManifest, SkillReference, LATEST};
use async_trait::async_trait;
use std::path::PathBuf;

/// Resolves a skill reference into a bundle.
#[async_trait]
pub trait SkillRegistry: Send + Sync {
    async fn resolve(&self, reference: &SkillReference) -> Result<SkillBundle, InstallError>;
}

/// Directory-backed registry: `<root>/<name>/<version>/` holds one bundle
/// with a `manifest.json`. `latest` resolves to the lexicographically
/// greatest version directory.
pub struct DirRegistry {
    root: PathBuf,
}

impl DirRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn not_found(reference: &SkillReference, message: impl Into<String>) -> InstallError {
        InstallError::Registry {
            reference: reference.identity(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl SkillRegistry for DirRegistry {
    async fn resolve(&self, reference: &SkillReference) -> Result<SkillBundle, InstallError> {
        let skill_dir = self.root.join(&reference.name);
        if !skill_dir.is_dir() {
            return Err(Self::not_found(reference, "unknown skill name"));
        }

        let version = if reference.version == LATEST {
            let mut versions: Vec<String> = std::fs::read_dir(&skill_dir)?
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_dir())
                .filter_map(|e| e.file_name().into_string().ok())
                .collect();
            versions.sort();
            versions
                .pop()
                .ok_or_else(|| Self::not_found(reference, "no published versions"))?
        } else {
            reference.version.clone()
        };

        let source_path = skill_dir.join(&version);
        let manifest_path = source_path.join(artifacts::MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(Self::not_found(reference, "bundle has no manifest.json"));
        }

        let raw = tokio::fs::read(&manifest_path).await?;
        let manifest: SkillManifest = serde_json::from_slice(&raw)?;
        Ok(SkillBundle {
            manifest,
            source_path,
        })
    }
}
