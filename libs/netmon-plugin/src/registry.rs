// [libs/netmon-plugin/src/registry.rs]
//! On start, scans a plugin directory where each subdirectory carries a
//! `manifest.json` and an executable whose basename matches the
//! subdirectory name. Missing manifest or missing binary is skipped with
//! a warning — never an abort.

use netmon_protocol::PluginManifest;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum PluginRegistryError {
    #[error("failed to read plugin directory {0:?}: {1}")]
    DirectoryUnreadable(PathBuf, std::io::Error),
}

#[derive(Debug, Clone)]
struct PluginEntry {
    manifest: PluginManifest,
    binary_path: PathBuf,
}

/// Indices over the discovered plugins. `by_protocol` is unique per
/// protocol — a second manifest claiming an already-registered protocol
/// is skipped with a warning, first-found wins.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    by_id: HashMap<String, PluginEntry>,
    by_protocol: HashMap<String, String>,
    by_port: HashMap<u16, String>,
}

impl PluginRegistry {
    pub fn scan(plugin_directory: &Path) -> Result<Self, PluginRegistryError> {
        let mut registry = Self::default();

        let entries = std::fs::read_dir(plugin_directory)
            .map_err(|e| PluginRegistryError::DirectoryUnreadable(plugin_directory.to_path_buf(), e))?;

        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            registry.try_load_one(&entry.path());
        }

        Ok(registry)
    }

    fn try_load_one(&mut self, subdirectory: &Path) {
        let subdir_name = match subdirectory.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => return,
        };

        let manifest_path = subdirectory.join("manifest.json");
        let manifest_bytes = match std::fs::read(&manifest_path) {
            Ok(bytes) => bytes,
            Err(_) => {
                warn!(directory = %subdirectory.display(), "plugin directory has no manifest.json, skipping");
                return;
            }
        };

        let manifest: PluginManifest = match serde_json::from_slice(&manifest_bytes) {
            Ok(m) => m,
            Err(e) => {
                warn!(directory = %subdirectory.display(), error = %e, "plugin manifest.json is malformed, skipping");
                return;
            }
        };

        let binary_path = subdirectory.join(&subdir_name);
        if !binary_path.is_file() {
            warn!(directory = %subdirectory.display(), expected = %binary_path.display(), "plugin binary not found, skipping");
            return;
        }

        if self.by_protocol.contains_key(&manifest.protocol) {
            warn!(protocol = %manifest.protocol, plugin_id = %manifest.id, "protocol already registered by another plugin, skipping");
            return;
        }

        self.by_protocol.insert(manifest.protocol.clone(), manifest.id.clone());
        self.by_port.insert(manifest.default_port, manifest.id.clone());
        self.by_id.insert(manifest.id.clone(), PluginEntry { manifest, binary_path });
    }

    pub fn get_by_id(&self, id: &str) -> Option<&PluginManifest> {
        self.by_id.get(id).map(|entry| &entry.manifest)
    }

    pub fn get_by_protocol(&self, protocol: &str) -> Option<&PluginManifest> {
        let id = self.by_protocol.get(protocol)?;
        self.get_by_id(id)
    }

    pub fn get_by_port(&self, port: u16) -> Option<&PluginManifest> {
        let id = self.by_port.get(&port)?;
        self.get_by_id(id)
    }

    pub(crate) fn binary_path(&self, id: &str) -> Option<&Path> {
        self.by_id.get(id).map(|entry| entry.binary_path.as_path())
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_manifest(dir: &Path, id: &str, protocol: &str, default_port: u16) {
        let body = format!(
            r#"{{"id":"{id}","name":"{id}","version":"0.1.0","protocol":"{protocol}","default_port":{default_port},"timeout_ms":5000}}"#
        );
        std::fs::write(dir.join("manifest.json"), body).unwrap();
    }

    #[test]
    fn skips_subdirectory_missing_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("ssh-plugin")).unwrap();

        let registry = PluginRegistry::scan(tmp.path()).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn skips_subdirectory_missing_binary() {
        let tmp = tempfile::tempdir().unwrap();
        let plugin_dir = tmp.path().join("ssh-plugin");
        std::fs::create_dir(&plugin_dir).unwrap();
        write_manifest(&plugin_dir, "ssh-plugin", "ssh", 22);

        let registry = PluginRegistry::scan(tmp.path()).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn loads_a_well_formed_plugin() {
        let tmp = tempfile::tempdir().unwrap();
        let plugin_dir = tmp.path().join("ssh-plugin");
        std::fs::create_dir(&plugin_dir).unwrap();
        write_manifest(&plugin_dir, "ssh-plugin", "ssh", 22);

        let binary_path = plugin_dir.join("ssh-plugin");
        let mut file = std::fs::File::create(&binary_path).unwrap();
        file.write_all(b"#!/bin/sh\n").unwrap();

        let registry = PluginRegistry::scan(tmp.path()).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get_by_id("ssh-plugin").is_some());
        assert!(registry.get_by_protocol("ssh").is_some());
        assert!(registry.get_by_port(22).is_some());
    }
}
