//! Composite identifiers of the form `<parent-id>/<object-id>`.

use crate::error::{ProviderError, Result};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalId {
    pub parent: String,
    pub object: String,
}

impl LocalId {
    pub fn new(parent: &str, object: &str) -> Self {
        Self {
            parent: parent.to_string(),
            object: object.to_string(),
        }
    }

    /// Split once on the first `/`. Both halves must be non-empty.
    pub fn parse(id: &str) -> Result<Self> {
        let Some((parent, object)) = id.split_once('/') else {
            return Err(ProviderError::InvalidId {
                id: id.to_string(),
                reason: "expected <parent-id>/<object-id>".to_string(),
            });
        };
        if parent.is_empty() || object.is_empty() {
            return Err(ProviderError::InvalidId {
                id: id.to_string(),
                reason: "both halves must be non-empty".to_string(),
            });
        }
        Ok(Self::new(parent, object))
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.parent, self.object)
    }
}
