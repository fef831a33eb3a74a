//! Type Registry - Load type definitions from JSON
//!
//! Every resource and data-source type the CLI knows about is described in
//! an embedded JSON file. Behaviour lives in [`super::dispatch`]; this is the
//! catalog used for lookups, help output and argument handling.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Embedded type JSON (compiled into the binary)
const TYPE_FILES: &[&str] = &[include_str!("../resources/types.json")];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Resource,
    DataSource,
}

impl std::fmt::Display for TypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeKind::Resource => write!(f, "resource"),
            TypeKind::DataSource => write!(f, "data source"),
        }
    }
}

/// Data-source argument
#[derive(Debug, Clone, Deserialize)]
pub struct ArgDef {
    pub name: String,
    #[serde(default)]
    pub required: bool,
}

/// Type definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct TypeDef {
    pub display_name: String,
    pub kind: TypeKind,
    pub service: String,
    /// Shape of the ID, for resources
    #[serde(default)]
    pub id_format: Option<String>,
    #[serde(default)]
    pub args: Vec<ArgDef>,
}

impl TypeDef {
    /// Argument filled by a bare positional value on the command line
    pub fn primary_arg(&self) -> Option<&str> {
        self.args
            .iter()
            .find(|a| a.required)
            .map(|a| a.name.as_str())
    }
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize)]
pub struct TypeConfig {
    #[serde(default)]
    pub types: BTreeMap<String, TypeDef>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<TypeConfig> = OnceLock::new();

/// Get the type registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static TypeConfig {
    REGISTRY.get_or_init(|| {
        let mut final_config = TypeConfig {
            types: BTreeMap::new(),
        };

        for content in TYPE_FILES {
            let partial: TypeConfig = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded type JSON: {}", e));
            final_config.types.extend(partial.types);
        }

        final_config
    })
}

/// Get a type definition by name
pub fn get_type(name: &str) -> Option<&'static TypeDef> {
    get_registry().types.get(name)
}

/// Type names of one kind, sorted
pub fn type_names(kind: TypeKind) -> Vec<&'static str> {
    get_registry()
        .types
        .iter()
        .filter(|(_, def)| def.kind == kind)
        .map(|(name, _)| name.as_str())
        .collect()
}
