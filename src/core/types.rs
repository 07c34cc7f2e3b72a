use super::{RelError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Auxiliary attributes carried onto a join record.
pub type Extra = serde_json::Map<String, serde_json::Value>;

/// Name of a relation connecting two object types (e.g. `related_objects`).
pub type RelationKey = String;

/// Identity of a relationship endpoint: the `(id, type)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetKey {
    pub id: i64,
    pub type_name: String,
}

impl TargetKey {
    pub fn new(id: i64, type_name: impl Into<String>) -> Self {
        Self {
            id,
            type_name: type_name.into(),
        }
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_name, self.id)
    }
}

/// Flattened view of an object that lives behind a reference
/// (e.g. a snapshot of an object owned by another service).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSnapshot {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Classification of the referenced object (its own type name).
    pub class_name: String,
    #[serde(default)]
    pub link: Option<String>,
}

/// A fully hydrated related object, as held by the local object cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedObject {
    pub id: i64,
    pub type_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub fields: Extra,
}

impl RelatedObject {
    pub fn new(id: i64, type_name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id,
            type_name: type_name.into(),
            title: title.into(),
            fields: Extra::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn key(&self) -> TargetKey {
        TargetKey::new(self.id, self.type_name.clone())
    }

    pub fn to_target(&self) -> Target {
        Target::new(self.id, self.type_name.clone()).with_payload(Payload::Object(self.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// Lightweight pointer to an object materialized elsewhere.
    Reference(ReferenceSnapshot),
    Object(RelatedObject),
}

/// Reference to a related domain object.
///
/// Identity is `(id, type_name)`; the payload never takes part in identity.
/// `id` is optional only so that incomplete references coming from the UI can be
/// rejected with [`RelError::ValidationGap`] instead of being silently coerced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: Option<i64>,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

impl Target {
    pub fn new(id: i64, type_name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            type_name: type_name.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn reference(id: i64, type_name: impl Into<String>, snapshot: ReferenceSnapshot) -> Self {
        Self::new(id, type_name).with_payload(Payload::Reference(snapshot))
    }

    /// Validated identity of this target.
    pub fn key(&self) -> Result<TargetKey> {
        let id = self.id.ok_or_else(|| {
            RelError::ValidationGap(format!("target of type '{}' has no id", self.type_name))
        })?;
        if self.type_name.trim().is_empty() {
            return Err(RelError::ValidationGap(format!(
                "target {} has no type",
                id
            )));
        }
        Ok(TargetKey::new(id, self.type_name.clone()))
    }

    /// Whether both targets address the same relationship endpoint.
    pub fn same_endpoint(&self, other: &Target) -> bool {
        self.id.is_some() && self.id == other.id && self.type_name == other.type_name
    }

    pub fn matches_key(&self, key: &TargetKey) -> bool {
        self.id == Some(key.id) && self.type_name == key.type_name
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.payload, Some(Payload::Reference(_)))
    }
}

/// The entity being edited. `id` stays `None` until the create call returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub id: Option<i64>,
    #[serde(rename = "type")]
    pub type_name: String,
}

impl OwnerRef {
    pub fn new(id: i64, type_name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            type_name: type_name.into(),
        }
    }

    pub fn unsaved(type_name: impl Into<String>) -> Self {
        Self {
            id: None,
            type_name: type_name.into(),
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn require_id(&self) -> Result<i64> {
        self.id.ok_or_else(|| {
            RelError::InvalidState(format!("owner of type '{}' is not persisted", self.type_name))
        })
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "{}#{}", self.type_name, id),
            None => write!(f, "{}#<new>", self.type_name),
        }
    }
}
