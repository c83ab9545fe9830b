//! The actor whose access is being decided

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Actor performing an action: a set of roles plus free-form attributes
///
/// Policies reference attributes with dotted paths (`"org.id"`), so nested
/// objects are allowed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Actor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Actor with no roles and no attributes
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn has_any_role(&self, roles: &[String]) -> bool {
        roles.iter().any(|r| self.has_role(r))
    }

    /// Resolve a dotted attribute path
    pub fn attribute(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.attributes.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Deterministic string identity used for decision caching
    pub fn cache_key(&self) -> String {
        let mut roles = self.roles.clone();
        roles.sort();
        let attributes = serde_json::to_string(&self.attributes).unwrap_or_default();
        format!("{}|{}", roles.join(","), attributes)
    }
}
