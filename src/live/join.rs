use crate::core::Extra;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A backend many-to-many row linking an owner to an option.
///
/// `id` is `None` until the record has been persisted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JoinRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(flatten)]
    pub fields: Extra,
}

impl JoinRecord {
    pub fn new(fields: Extra) -> Self {
        Self { id: None, fields }
    }

    pub fn persisted(id: i64, fields: Extra) -> Self {
        Self {
            id: Some(id),
            fields,
        }
    }

    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.fields.insert(field.to_string(), value.into());
    }

    /// Integer stored directly under `field`.
    pub fn flat_id(&self, field: &str) -> Option<i64> {
        self.fields.get(field).and_then(as_id)
    }

    /// `id` member of the nested `{id, type}` object stored under `attr`.
    pub fn nested_id(&self, attr: &str) -> Option<i64> {
        self.fields
            .get(attr)
            .and_then(|nested| nested.get("id"))
            .and_then(as_id)
    }

    pub fn nested_type(&self, attr: &str) -> Option<&str> {
        self.fields
            .get(attr)
            .and_then(|nested| nested.get("type"))
            .and_then(Value::as_str)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

// Ids may arrive as numbers or numeric strings depending on the backend.
fn as_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
