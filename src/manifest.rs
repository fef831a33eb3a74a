//! Desired-state manifest (YAML)
//!
//! ```yaml
//! resources:
//!   - type: ibm_metrics_router_target
//!     name: primary
//!     config: { name: my-target, destination_crn: "crn:..." }
//!   - type: ibm_metrics_router_route
//!     name: r1
//!     config:
//!       name: r1
//!       rules:
//!         - target_ids: ["${ibm_metrics_router_target.primary.id}"]
//! ```
//!
//! String values may reference attributes of entries listed earlier with
//! `${<type>.<name>.<attribute>}`. References resolve against state.

use crate::resource::dispatch;
use crate::state::{address, StateFile};
use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub resources: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestEntry {
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
    #[serde(default)]
    pub config: Value,
}

impl ManifestEntry {
    pub fn address(&self) -> String {
        address(&self.type_name, &self.name)
    }
}

/// `${type.name.attribute}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub type_name: String,
    pub name: String,
    pub attribute: String,
}

fn reference_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([a-z0-9_]+)\.([A-Za-z0-9_\-]+)\.([A-Za-z0-9_.]+)\}").expect("static regex")
    })
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("in manifest {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let manifest: Self = serde_yaml::from_str(content).context("invalid manifest YAML")?;
        manifest.check()?;
        Ok(manifest)
    }

    /// Structural checks: known types, unique names, backward-only references
    pub fn check(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.resources {
            if !dispatch::is_resource_type(&entry.type_name) {
                anyhow::bail!("{}: unknown resource type {:?}", entry.address(), entry.type_name);
            }
            if entry.name.is_empty() {
                anyhow::bail!("{} entry has an empty name", entry.type_name);
            }
            if !entry.config.is_object() {
                anyhow::bail!("{}: config must be a mapping", entry.address());
            }
            for reference in references(&entry.config) {
                let target = address(&reference.type_name, &reference.name);
                if !seen.contains(&target) {
                    anyhow::bail!(
                        "{} references {}, which is not declared earlier in the manifest",
                        entry.address(),
                        target
                    );
                }
            }
            if !seen.insert(entry.address()) {
                anyhow::bail!("{} is declared twice", entry.address());
            }
        }
        Ok(())
    }

    pub fn find(&self, type_name: &str, name: &str) -> Option<&ManifestEntry> {
        self.resources
            .iter()
            .find(|e| e.type_name == type_name && e.name == name)
    }
}

/// Every reference in a config, in document order
pub fn references(config: &Value) -> Vec<Reference> {
    let mut found = Vec::new();
    collect_references(config, &mut found);
    found
}

fn collect_references(value: &Value, found: &mut Vec<Reference>) {
    match value {
        Value::String(s) => {
            for caps in reference_pattern().captures_iter(s) {
                found.push(Reference {
                    type_name: caps[1].to_string(),
                    name: caps[2].to_string(),
                    attribute: caps[3].to_string(),
                });
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, found)),
        Value::Object(map) => map.values().for_each(|v| collect_references(v, found)),
        _ => {}
    }
}

/// Look up a referenced attribute in state
fn lookup(state: &StateFile, reference: &Reference) -> Option<String> {
    let stored = state.find(&reference.type_name, &reference.name)?;
    if reference.attribute == "id" {
        return Some(stored.id.clone());
    }

    let mut current = &stored.attributes;
    for part in reference.attribute.split('.') {
        current = current.get(part)?;
    }
    match current {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Substitute references; unresolved ones are an error when `strict`, and
/// otherwise left in place (used for planning before anything exists)
pub fn resolve(config: &Value, state: &StateFile, strict: bool) -> Result<Value> {
    match config {
        Value::String(s) => {
            let mut missing = None;
            let replaced = reference_pattern().replace_all(s, |caps: &regex::Captures| {
                let reference = Reference {
                    type_name: caps[1].to_string(),
                    name: caps[2].to_string(),
                    attribute: caps[3].to_string(),
                };
                match lookup(state, &reference) {
                    Some(value) => value,
                    None => {
                        missing = Some(caps[0].to_string());
                        caps[0].to_string()
                    }
                }
            });
            if let (true, Some(reference)) = (strict, missing) {
                anyhow::bail!("cannot resolve {reference}: not in state");
            }
            Ok(Value::String(replaced.into_owned()))
        }
        Value::Array(items) => Ok(Value::Array(
            items
                .iter()
                .map(|v| resolve(v, state, strict))
                .collect::<Result<_>>()?,
        )),
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                out.insert(k.clone(), resolve(v, state, strict)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}
