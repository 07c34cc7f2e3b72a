use crate::core::{Extra, RelError, RelatedObject, Result};
use crate::interface::JoinStore;
use crate::live::JoinRecord;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Join table kept in memory.
///
/// Like a REST backend, the store materializes nested `{id, type}` references
/// into flat `<attr>_id` / `<attr>_type` columns when a join is created, so
/// joins written in either addressing style can be queried by flat fields.
#[derive(Default)]
pub struct InMemoryJoinStore {
    joins: RwLock<BTreeMap<i64, JoinRecord>>,
    options: RwLock<Vec<RelatedObject>>,
    next_id: AtomicI64,
    creates: AtomicUsize,
    refreshes: AtomicUsize,
    destroys: AtomicUsize,
    fail_next_create: AtomicBool,
    conflict_on_destroy: AtomicBool,
}

impl InMemoryJoinStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    pub async fn add_option(&self, option: RelatedObject) {
        self.options.write().await.push(option);
    }

    /// Inserts an already persisted join, assigning an id when it has none.
    pub async fn seed(&self, join: JoinRecord) -> JoinRecord {
        let stored = self.materialize(join);
        self.joins.write().await.insert(stored.id.unwrap_or_default(), stored.clone());
        stored
    }

    /// Simulates a concurrent server-side edit of a stored join.
    pub async fn touch(&self, id: i64, field: &str, value: impl Into<Value>) -> Result<()> {
        let mut joins = self.joins.write().await;
        let join = joins
            .get_mut(&id)
            .ok_or_else(|| RelError::NotFound(format!("join {}", id)))?;
        join.set(field, value);
        Ok(())
    }

    /// Simulates a join deleted by someone else.
    pub async fn remove(&self, id: i64) -> Option<JoinRecord> {
        self.joins.write().await.remove(&id)
    }

    pub async fn stored(&self) -> Vec<JoinRecord> {
        self.joins.read().await.values().cloned().collect()
    }

    pub fn fail_next_create(&self) {
        self.fail_next_create.store(true, Ordering::SeqCst);
    }

    pub fn conflict_on_destroy(&self, conflict: bool) {
        self.conflict_on_destroy.store(conflict, Ordering::SeqCst);
    }

    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn destroy_calls(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }

    /// Number of create, refresh and destroy calls received.
    pub fn network_calls(&self) -> usize {
        self.create_calls() + self.refresh_calls() + self.destroy_calls()
    }

    fn materialize(&self, mut join: JoinRecord) -> JoinRecord {
        if join.id.is_none() {
            join.id = Some(self.next_id.fetch_add(1, Ordering::SeqCst));
        }
        let nested: Vec<(String, Value, Option<Value>)> = join
            .fields
            .iter()
            .filter_map(|(attr, value)| {
                let id = value.get("id")?.clone();
                Some((attr.clone(), id, value.get("type").cloned()))
            })
            .collect();
        for (attr, id, type_name) in nested {
            join.fields.entry(format!("{}_id", attr)).or_insert(id);
            if let Some(type_name) = type_name {
                join.fields.entry(format!("{}_type", attr)).or_insert(type_name);
            }
        }
        join
    }
}

fn matches_query(fields: &Extra, query: &Extra) -> bool {
    query.iter().all(|(name, expected)| fields.get(name) == Some(expected))
}

fn option_matches(option: &RelatedObject, query: &Extra) -> bool {
    query.iter().all(|(name, expected)| match name.as_str() {
        "type" => expected.as_str() == Some(option.type_name.as_str()),
        "id" => expected.as_i64() == Some(option.id),
        _ => option.fields.get(name) == Some(expected),
    })
}

#[async_trait]
impl JoinStore for InMemoryJoinStore {
    async fn find_options(&self, query: &Extra) -> Result<Vec<RelatedObject>> {
        Ok(self
            .options
            .read()
            .await
            .iter()
            .filter(|option| option_matches(option, query))
            .cloned()
            .collect())
    }

    async fn find_joins(&self, query: &Extra) -> Result<Vec<JoinRecord>> {
        Ok(self
            .joins
            .read()
            .await
            .values()
            .filter(|join| matches_query(&join.fields, query))
            .cloned()
            .collect())
    }

    async fn create(&self, join: &JoinRecord) -> Result<JoinRecord> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(RelError::Store("create request rejected".to_string()));
        }
        if !join.is_new() {
            return Err(RelError::InvalidState(format!(
                "join {:?} is already persisted",
                join.id
            )));
        }
        Ok(self.seed(join.clone()).await)
    }

    async fn refresh(&self, join: &JoinRecord) -> Result<JoinRecord> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let id = join
            .id
            .ok_or_else(|| RelError::InvalidState("cannot refresh an unsaved join".to_string()))?;
        self.joins
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| RelError::NotFound(format!("join {}", id)))
    }

    async fn destroy(&self, join: &JoinRecord) -> Result<()> {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        let id = join
            .id
            .ok_or_else(|| RelError::InvalidState("cannot destroy an unsaved join".to_string()))?;
        if self.conflict_on_destroy.load(Ordering::SeqCst) {
            return Err(RelError::StaleJoinConflict(format!(
                "join {} was modified concurrently",
                id
            )));
        }
        self.joins
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RelError::NotFound(format!("join {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_materializes_nested_reference() {
        let store = InMemoryJoinStore::new();
        let draft: JoinRecord = serde_json::from_value(json!({
            "person_id": 4,
            "personable": {"id": 9, "type": "Program"}
        }))
        .unwrap();

        let saved = store.create(&draft).await.unwrap();
        assert_eq!(saved.id, Some(1));

        let mut query = Extra::new();
        query.insert("personable_id".into(), json!(9));
        query.insert("personable_type".into(), json!("Program"));
        assert_eq!(store.find_joins(&query).await.unwrap(), vec![saved]);
    }

    #[tokio::test]
    async fn test_destroy_conflict() {
        let store = InMemoryJoinStore::new();
        let saved = store.seed(JoinRecord::new(Extra::new())).await;
        store.conflict_on_destroy(true);

        let err = store.destroy(&saved).await.unwrap_err();
        assert!(matches!(err, RelError::StaleJoinConflict(_)));
        assert_eq!(store.stored().await.len(), 1);
    }
}
