use crate::core::{Extra, RelError, RelationKey, Result, Target};
use crate::live::Addressing;
use serde::Deserialize;

/// Relation used for the objects pre-seeded through [`ConnectorConfig::default_mappings`].
pub const DEFAULT_MAPPING_RELATION: &str = "related_objects_as_source";

/// What a drain with nothing to resolve should announce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyDrainPolicy {
    /// Emit a single `SubtreeChanged` even when nothing was mapped or unmapped.
    #[default]
    Notify,
    /// Stay silent.
    Skip,
}

/// An object the session should attach as soon as it opens.
///
/// Entries missing either part of the identity are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DefaultMapping {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
}

impl DefaultMapping {
    pub fn new(id: i64, type_name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            type_name: Some(type_name.into()),
        }
    }

    pub fn to_target(&self) -> Option<Target> {
        match (self.id, self.type_name.as_deref()) {
            (Some(id), Some(type_name)) if !type_name.is_empty() => {
                Some(Target::new(id, type_name))
            }
            _ => None,
        }
    }
}

/// Configuration of a deferred edit session (modal connector).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Relation pinned by the caller. When unset, each target's relation is
    /// resolved from the owner and target type names.
    pub mapping: Option<RelationKey>,

    /// Relation used to load the baseline; falls back to `mapping`.
    pub source_mapping: Option<RelationKey>,

    /// Forwarded to map calls for reference-type targets.
    pub use_snapshots: bool,

    /// The caller loads the baseline itself; `open()` skips the store load.
    pub custom_related_loader: bool,

    pub default_mappings: Vec<DefaultMapping>,

    pub empty_drain: EmptyDrainPolicy,
}

impl ConnectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Pin the relation used for every target
    pub fn mapping(mut self, relation: &str) -> Self {
        self.mapping = Some(relation.to_string());
        self
    }

    pub fn source_mapping(mut self, relation: &str) -> Self {
        self.source_mapping = Some(relation.to_string());
        self
    }

    pub fn use_snapshots(mut self, enabled: bool) -> Self {
        self.use_snapshots = enabled;
        self
    }

    pub fn custom_related_loader(mut self, enabled: bool) -> Self {
        self.custom_related_loader = enabled;
        self
    }

    pub fn default_mapping(mut self, mapping: DefaultMapping) -> Self {
        self.default_mappings.push(mapping);
        self
    }

    pub fn empty_drain(mut self, policy: EmptyDrainPolicy) -> Self {
        self.empty_drain = policy;
        self
    }

    /// Relation the baseline is loaded from, if any.
    pub fn baseline_relation(&self) -> Option<&str> {
        self.source_mapping
            .as_deref()
            .or(self.mapping.as_deref())
    }
}

/// Configuration of a live selector: how join records address both sides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SelectorConfig {
    /// Attribute holding the option reference on a join (e.g. `person`).
    pub option_attr: String,

    /// Attribute holding the owner reference on a join (e.g. `personable`).
    pub owner_attr: String,

    pub option_addressing: Addressing,

    pub owner_addressing: Addressing,

    /// Option model when it is fixed for the selector.
    #[serde(default)]
    pub option_type: Option<String>,

    #[serde(default)]
    pub option_query: Extra,

    #[serde(default)]
    pub join_query: Extra,

    /// Fields copied onto every new join and into the join query.
    #[serde(default)]
    pub extra_join_fields: Extra,
}

impl SelectorConfig {
    pub fn new(
        option_attr: &str,
        owner_attr: &str,
        option_addressing: Addressing,
        owner_addressing: Addressing,
    ) -> Self {
        Self {
            option_attr: option_attr.to_string(),
            owner_attr: owner_attr.to_string(),
            option_addressing,
            owner_addressing,
            option_type: None,
            option_query: Extra::new(),
            join_query: Extra::new(),
            extra_join_fields: Extra::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// People attached to any object (`ObjectPerson`).
    pub fn object_people() -> Self {
        Self::new(
            "person",
            "personable",
            Addressing::monomorphic("person_id"),
            Addressing::polymorphic("personable_id", "personable_type"),
        )
        .option_type("Person")
    }

    /// Documents attached to any object (`ObjectDocument`).
    pub fn object_documents() -> Self {
        Self::new(
            "document",
            "documentable",
            Addressing::monomorphic("document_id"),
            Addressing::polymorphic("documentable_id", "documentable_type"),
        )
        .option_type("Document")
    }

    /// Controls of a system (`SystemControl`).
    pub fn system_controls() -> Self {
        Self::new(
            "control",
            "system",
            Addressing::monomorphic("control_id"),
            Addressing::monomorphic("system_id"),
        )
        .option_type("Control")
    }

    /// Directives of a program (`ProgramDirective`); the directive kind varies per join.
    pub fn program_directives() -> Self {
        Self::new(
            "directive",
            "program",
            Addressing::polymorphic("directive_id", "directive_type"),
            Addressing::monomorphic("program_id"),
        )
    }

    pub fn option_type(mut self, type_name: &str) -> Self {
        self.option_type = Some(type_name.to_string());
        self
    }

    pub fn option_query(mut self, field: &str, value: impl Into<serde_json::Value>) -> Self {
        self.option_query.insert(field.to_string(), value.into());
        self
    }

    pub fn join_query(mut self, field: &str, value: impl Into<serde_json::Value>) -> Self {
        self.join_query.insert(field.to_string(), value.into());
        self
    }

    pub fn extra_join_field(mut self, field: &str, value: impl Into<serde_json::Value>) -> Self {
        self.extra_join_fields.insert(field.to_string(), value.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.option_attr.trim().is_empty() || self.owner_attr.trim().is_empty() {
            return Err(RelError::Config(
                "option_attr and owner_attr must be set".to_string(),
            ));
        }
        self.option_addressing.validate()?;
        self.owner_addressing.validate()?;
        if let Some(option_type) = &self.option_type {
            if option_type.trim().is_empty() {
                return Err(RelError::Config("option_type must not be empty".to_string()));
            }
        }
        Ok(())
    }
}
