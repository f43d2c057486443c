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

//! Deterministic content hash of a skill bundle's file tree.
//!
//! Each file contributes a `"<relative-path>:<hex sha256>"` record. Records
//! are sorted lexicographically (the digest is independent of traversal
//! order) and joined with newlines before a final SHA-256. `manifest.json`
//! is hashed in normalized form with its own `checksum` field removed, so a
//! checksum can describe its own manifest without circularity.

use crate::core::constants::artifacts;
use crate::core::errors::InstallError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Computes the tree digest of every file under `root`. Pure: reads only.
pub fn checksum_directory_tree(root: &Path) -> Result<String, InstallError> {
    let mut records = Vec::new();
    collect_records(root, root, &mut records)?;
    records.sort();

    let mut hasher = Sha256::new();
    hasher.update(records.join("\n").as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

fn collect_records(
    root: &Path,
    dir: &Path,
    records: &mut Vec<String>,
) -> Result<(), InstallError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_records(root, &path, records)?;
        } else {
            records.push(file_record(root, &path)?);
        }
    }
    Ok(())
}

fn file_record(root: &Path, path: &Path) -> Result<String, InstallError> {
    let bytes = std::fs::read(path)?;
    let hashed = if path.file_name().and_then(|n| n.to_str()) == Some(artifacts::MANIFEST_FILE) {
        normalize_manifest(&bytes)?
    } else {
        bytes
    };

    let relative = path
        .strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    Ok(format!("{}:{}", relative, hex::encode(Sha256::digest(&hashed))))
}

/// Parses a manifest, strips the `checksum` key, and re-serializes.
/// serde_json's sorted object keys make the result canonical.
fn normalize_manifest(bytes: &[u8]) -> Result<Vec<u8>, InstallError> {
    let mut value: serde_json::Value = serde_json::from_slice(bytes)?;
    if let Some(obj) = value.as_object_mut() {
        obj.remove("checksum");
    }
    Ok(serde_json::to_vec(&value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn digest_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "alpha");
        write(dir.path(), "sub/b.txt", "beta");
        let first = checksum_directory_tree(dir.path()).unwrap();
        let second = checksum_directory_tree(dir.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn content_change_changes_digest() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "alpha");
        let before = checksum_directory_tree(dir.path()).unwrap();
        write(dir.path(), "a.txt", "alpha2");
        let after = checksum_directory_tree(dir.path()).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn rename_changes_digest() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "alpha");
        let before = checksum_directory_tree(dir.path()).unwrap();
        fs::rename(dir.path().join("a.txt"), dir.path().join("b.txt")).unwrap();
        let after = checksum_directory_tree(dir.path()).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn added_file_changes_digest() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "alpha");
        let before = checksum_directory_tree(dir.path()).unwrap();
        write(dir.path(), "new.txt", "new");
        let after = checksum_directory_tree(dir.path()).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn manifest_checksum_field_is_excluded() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "manifest.json",
            r#"{"name":"echo","version":"1.0.0"}"#,
        );
        let before = checksum_directory_tree(dir.path()).unwrap();
        write(
            dir.path(),
            "manifest.json",
            &format!(r#"{{"name":"echo","version":"1.0.0","checksum":"{}"}}"#, before),
        );
        let after = checksum_directory_tree(dir.path()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn manifest_other_field_change_changes_digest() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "manifest.json",
            r#"{"name":"echo","version":"1.0.0"}"#,
        );
        let before = checksum_directory_tree(dir.path()).unwrap();
        write(
            dir.path(),
            "manifest.json",
            r#"{"name":"echo","version":"1.0.1"}"#,
        );
        let after = checksum_directory_tree(dir.path()).unwrap();
        assert_ne!(before, after);
    }
}
