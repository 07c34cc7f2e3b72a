use super::JoinRecord;
use crate::config::SelectorConfig;
use crate::core::{Extra, RelError, Result, TargetKey};
use serde::Deserialize;
use serde_json::json;

/// How one side of a join refers to its object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "addressing", rename_all = "snake_case")]
pub enum Addressing {
    /// The target type is fixed by the join model; a flat id field is enough.
    Monomorphic { id_field: String },
    /// The target type varies per record and travels next to the id.
    Polymorphic { id_field: String, type_field: String },
}

impl Addressing {
    pub fn monomorphic(id_field: &str) -> Self {
        Addressing::Monomorphic {
            id_field: id_field.to_string(),
        }
    }

    pub fn polymorphic(id_field: &str, type_field: &str) -> Self {
        Addressing::Polymorphic {
            id_field: id_field.to_string(),
            type_field: type_field.to_string(),
        }
    }

    pub fn id_field(&self) -> &str {
        match self {
            Addressing::Monomorphic { id_field } | Addressing::Polymorphic { id_field, .. } => {
                id_field
            }
        }
    }

    pub fn type_field(&self) -> Option<&str> {
        match self {
            Addressing::Monomorphic { .. } => None,
            Addressing::Polymorphic { type_field, .. } => Some(type_field),
        }
    }

    pub fn is_polymorphic(&self) -> bool {
        matches!(self, Addressing::Polymorphic { .. })
    }

    pub fn validate(&self) -> Result<()> {
        if self.id_field().trim().is_empty() {
            return Err(RelError::Config("addressing id_field must be set".to_string()));
        }
        if let Some(type_field) = self.type_field() {
            if type_field.trim().is_empty() {
                return Err(RelError::Config(
                    "polymorphic addressing needs a type_field".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Writes the reference to `key` into `fields` under `attr`.
    fn write(&self, attr: &str, key: &TargetKey, fields: &mut Extra) {
        match self {
            Addressing::Monomorphic { id_field } => {
                fields.insert(id_field.clone(), json!(key.id));
            }
            Addressing::Polymorphic { .. } => {
                fields.insert(
                    attr.to_string(),
                    json!({ "id": key.id, "type": key.type_name }),
                );
            }
        }
    }

    /// Query fields selecting every join that references `key`.
    fn write_query(&self, key: &TargetKey, query: &mut Extra) {
        query.insert(self.id_field().to_string(), json!(key.id));
        if let Some(type_field) = self.type_field() {
            query.insert(type_field.to_string(), json!(key.type_name));
        }
    }
}

/// Builds and reads join payloads for one selector configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PolymorphicJoinResolver {
    option_attr: String,
    owner_attr: String,
    option: Addressing,
    owner: Addressing,
    fixed_option_type: Option<String>,
    extra: Extra,
}

impl PolymorphicJoinResolver {
    pub fn from_config(config: &SelectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            option_attr: config.option_attr.clone(),
            owner_attr: config.owner_attr.clone(),
            option: config.option_addressing.clone(),
            owner: config.owner_addressing.clone(),
            fixed_option_type: config.option_type.clone(),
            extra: config.extra_join_fields.clone(),
        })
    }

    /// Payload of a new, unsaved join between `owner` and `option`.
    ///
    /// Type names come from the keys, i.e. the concrete runtime types of the
    /// referenced objects.
    pub fn build(&self, option: &TargetKey, owner: &TargetKey) -> JoinRecord {
        let mut fields = Extra::new();
        self.option.write(&self.option_attr, option, &mut fields);
        self.owner.write(&self.owner_attr, owner, &mut fields);
        for (name, value) in &self.extra {
            fields.insert(name.clone(), value.clone());
        }
        JoinRecord::new(fields)
    }

    /// Query used to list the joins of `owner`.
    pub fn owner_query(&self, owner: &TargetKey, base: &Extra) -> Extra {
        let mut query = base.clone();
        self.owner.write_query(owner, &mut query);
        for (name, value) in &self.extra {
            query.insert(name.clone(), value.clone());
        }
        query
    }

    /// Option id referenced by `join`, under either addressing style.
    pub fn option_id(&self, join: &JoinRecord) -> Option<i64> {
        join.flat_id(self.option.id_field())
            .or_else(|| join.nested_id(&self.option_attr))
    }

    /// Option type referenced by `join`. A polymorphic option side trusts the
    /// record first; a monomorphic one prefers the fixed option model.
    pub fn option_type(&self, join: &JoinRecord) -> Option<String> {
        let recorded = join
            .nested_type(&self.option_attr)
            .or_else(|| self.option.type_field().and_then(|field| join.text(field)));
        let fixed = self.fixed_option_type.as_deref();
        let chosen = if self.option.is_polymorphic() {
            recorded.or(fixed)
        } else {
            fixed.or(recorded)
        };
        chosen.map(str::to_string)
    }

    pub fn option_key(&self, join: &JoinRecord) -> Option<TargetKey> {
        Some(TargetKey::new(self.option_id(join)?, self.option_type(join)?))
    }

    /// Whether `join` references `option`. Ids are only unique per type, so a
    /// polymorphic option side compares the full key.
    pub fn matches(&self, option: &TargetKey, join: &JoinRecord) -> bool {
        if self.option.is_polymorphic() {
            self.option_key(join).as_ref() == Some(option)
        } else {
            self.option_id(join) == Some(option.id)
        }
    }
}
