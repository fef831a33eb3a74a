//! Local State File
//!
//! Stored state of every managed resource, keyed by `(type, name)`. The file
//! is rewritten after each apply step, so an interrupted run loses at most
//! the step in flight.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    /// Identifies one state history; stays fixed across saves
    pub lineage: String,
    /// Bumped on every save
    pub serial: u64,
    #[serde(default)]
    pub resources: Vec<StoredResource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResource {
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
    pub id: String,
    /// Reconciler state as JSON
    pub attributes: Value,
    /// Created but never read back; `attributes` holds only the ID and config
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pending: bool,
}

impl StoredResource {
    pub fn address(&self) -> String {
        address(&self.type_name, &self.name)
    }
}

/// `<type>.<name>`
pub fn address(type_name: &str, name: &str) -> String {
    format!("{type_name}.{name}")
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

impl StateFile {
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION,
            lineage: uuid::Uuid::new_v4().to_string(),
            serial: 0,
            resources: Vec::new(),
        }
    }

    /// Load state, starting fresh when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No state at {:?}, starting empty", path);
            return Ok(Self::new());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read state file {}", path.display()))?;
        let state: Self = serde_json::from_str(&content)
            .with_context(|| format!("state file {} is corrupt", path.display()))?;

        if state.version > STATE_VERSION {
            anyhow::bail!(
                "state file {} has version {}, this build understands up to {}",
                path.display(),
                state.version,
                STATE_VERSION
            );
        }
        Ok(state)
    }

    /// Write through a temporary file so a crash never leaves a torn file
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.serial += 1;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to replace {}", path.display()))?;

        tracing::debug!("Saved state serial {} to {:?}", self.serial, path);
        Ok(())
    }

    pub fn find(&self, type_name: &str, name: &str) -> Option<&StoredResource> {
        self.resources
            .iter()
            .find(|r| r.type_name == type_name && r.name == name)
    }

    /// Insert or replace in place, keeping the original position
    pub fn upsert(&mut self, resource: StoredResource) {
        match self
            .resources
            .iter_mut()
            .find(|r| r.type_name == resource.type_name && r.name == resource.name)
        {
            Some(existing) => *existing = resource,
            None => self.resources.push(resource),
        }
    }

    pub fn remove(&mut self, type_name: &str, name: &str) -> Option<StoredResource> {
        let pos = self
            .resources
            .iter()
            .position(|r| r.type_name == type_name && r.name == name)?;
        Some(self.resources.remove(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stored(name: &str, id: &str) -> StoredResource {
        StoredResource {
            type_name: "ibm_metrics_router_target".to_string(),
            name: name.to_string(),
            id: id.to_string(),
            attributes: json!({"id": id}),
            pending: false,
        }
    }

    #[test]
    fn test_missing_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateFile::load(&dir.path().join("state.json")).unwrap();
        assert!(state.resources.is_empty());
        assert_eq!(state.serial, 0);
    }

    #[test]
    fn test_save_and_load_keeps_lineage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut state = StateFile::new();
        state.upsert(stored("a", "t-1"));
        state.save(&path).unwrap();
        state.save(&path).unwrap();

        let loaded = StateFile::load(&path).unwrap();
        assert_eq!(loaded.lineage, state.lineage);
        assert_eq!(loaded.serial, 2);
        assert_eq!(loaded.resources, vec![stored("a", "t-1")]);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut state = StateFile::new();
        state.upsert(stored("a", "t-1"));
        state.upsert(stored("b", "t-2"));
        state.upsert(stored("a", "t-3"));

        assert_eq!(state.resources.len(), 2);
        assert_eq!(state.resources[0].id, "t-3");
        assert_eq!(state.remove("ibm_metrics_router_target", "b").unwrap().id, "t-2");
        assert!(state.find("ibm_metrics_router_target", "b").is_none());
    }

    #[test]
    fn test_pending_flag_only_written_when_set() {
        let mut resource = stored("a", "t-1");
        let text = serde_json::to_string(&resource).unwrap();
        assert!(!text.contains("pending"));

        resource.pending = true;
        let text = serde_json::to_string(&resource).unwrap();
        let back: StoredResource = serde_json::from_str(&text).unwrap();
        assert!(back.pending);
    }

    #[test]
    fn test_newer_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"version":99,"lineage":"x","serial":1}"#).unwrap();
        assert!(StateFile::load(&path).is_err());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = StateFile::load(&path).unwrap_err();
        assert!(err.to_string().contains("corrupt"));
    }
}
