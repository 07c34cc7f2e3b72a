use crate::core::{OwnerRef, RelError, Result, Target, TargetKey};
use crate::interface::{JoinOp, MapOptions, RelationshipStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, RwLock};

type RelationSlot = (TargetKey, String);

/// Holds map calls until released; lets callers act while a batch is in flight.
#[derive(Debug, Clone, Default)]
pub struct StoreGate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl StoreGate {
    /// Resolves once a gated call has started.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// Relationship store keeping one ordered member list per `(owner, relation)`.
#[derive(Default)]
pub struct InMemoryRelationshipStore {
    members: RwLock<HashMap<RelationSlot, Vec<Target>>>,
    map_calls: AtomicUsize,
    unmap_calls: AtomicUsize,
    fail_map: AtomicBool,
    fail_unmap: AtomicBool,
    last_map_options: Mutex<Option<MapOptions>>,
    gate: Mutex<Option<StoreGate>>,
}

impl InMemoryRelationshipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, owner: &OwnerRef, relation: &str, targets: Vec<Target>) -> Result<()> {
        let slot = (owner_key(owner)?, relation.to_string());
        self.members.write().await.insert(slot, targets);
        Ok(())
    }

    pub async fn members(&self, owner: &OwnerRef, relation: &str) -> Result<Vec<TargetKey>> {
        let slot = (owner_key(owner)?, relation.to_string());
        let members = self.members.read().await;
        Ok(members
            .get(&slot)
            .map(|targets| targets.iter().filter_map(|t| t.key().ok()).collect())
            .unwrap_or_default())
    }

    pub fn map_calls(&self) -> usize {
        self.map_calls.load(Ordering::SeqCst)
    }

    pub fn unmap_calls(&self) -> usize {
        self.unmap_calls.load(Ordering::SeqCst)
    }

    pub fn last_map_options(&self) -> Option<MapOptions> {
        self.last_map_options.lock().ok().and_then(|options| *options)
    }

    pub fn fail_map(&self, fail: bool) {
        self.fail_map.store(fail, Ordering::SeqCst);
    }

    pub fn fail_unmap(&self, fail: bool) {
        self.fail_unmap.store(fail, Ordering::SeqCst);
    }

    /// Gates the next map call. The call waits until [`StoreGate::release`].
    pub fn gate_next_map(&self) -> Result<StoreGate> {
        let gate = StoreGate::default();
        *self.gate.lock()? = Some(gate.clone());
        Ok(gate)
    }

    async fn pass_gate(&self) -> Result<()> {
        let gate = self.gate.lock()?.take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        Ok(())
    }
}

#[async_trait]
impl RelationshipStore for InMemoryRelationshipStore {
    async fn load_baseline(&self, owner: &OwnerRef, relation: &str) -> Result<Vec<Target>> {
        let slot = (owner_key(owner)?, relation.to_string());
        Ok(self
            .members
            .read()
            .await
            .get(&slot)
            .cloned()
            .unwrap_or_default())
    }

    async fn map_targets(
        &self,
        owner: &OwnerRef,
        ops: &[JoinOp],
        options: MapOptions,
    ) -> Result<()> {
        self.map_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_map_options.lock()? = Some(options);
        self.pass_gate().await?;

        if self.fail_map.load(Ordering::SeqCst) {
            return Err(RelError::Store("map request rejected".to_string()));
        }

        let owner = owner_key(owner)?;
        let mut members = self.members.write().await;
        for op in ops {
            let key = op.target.key()?;
            let slot = members.entry((owner.clone(), op.relation.clone())).or_default();
            if !slot.iter().any(|existing| existing.matches_key(&key)) {
                slot.push(op.target.clone());
            }
        }
        Ok(())
    }

    async fn unmap_targets(&self, owner: &OwnerRef, ops: &[JoinOp]) -> Result<()> {
        self.unmap_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_unmap.load(Ordering::SeqCst) {
            return Err(RelError::Store("unmap request rejected".to_string()));
        }

        let owner = owner_key(owner)?;
        let mut members = self.members.write().await;
        for op in ops {
            let key = op.target.key()?;
            if let Some(slot) = members.get_mut(&(owner.clone(), op.relation.clone())) {
                slot.retain(|existing| !existing.matches_key(&key));
            }
        }
        Ok(())
    }
}

fn owner_key(owner: &OwnerRef) -> Result<TargetKey> {
    Ok(TargetKey::new(owner.require_id()?, owner.type_name.clone()))
}
