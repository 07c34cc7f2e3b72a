use crate::core::RelationKey;
use crate::interface::MappingRegistry;
use std::collections::HashMap;

/// Table of relations keyed by `(owner type, target type)`.
#[derive(Debug, Clone, Default)]
pub struct StaticMappingRegistry {
    relations: HashMap<(String, String), RelationKey>,
    fallback: Option<RelationKey>,
}

impl StaticMappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relation(mut self, owner_type: &str, target_type: &str, relation: &str) -> Self {
        self.relations.insert(
            (owner_type.to_string(), target_type.to_string()),
            relation.to_string(),
        );
        self
    }

    /// Relation used for any pair without an explicit entry.
    pub fn fallback(mut self, relation: &str) -> Self {
        self.fallback = Some(relation.to_string());
        self
    }
}

impl MappingRegistry for StaticMappingRegistry {
    fn canonical_relation(&self, owner_type: &str, target_type: &str) -> Option<RelationKey> {
        self.relations
            .get(&(owner_type.to_string(), target_type.to_string()))
            .cloned()
            .or_else(|| self.fallback.clone())
    }
}
