use crate::core::{Payload, ReferenceSnapshot, RelatedObject, Result, Target, TargetKey};
use crate::interface::ObjectResolver;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;

/// A display-ready projection of one related object.
#[derive(Debug, Clone, PartialEq)]
pub enum MembershipEntry {
    /// Full object taken from the local cache.
    Hydrated(RelatedObject),
    /// Flattened projection of a reference-type target.
    Reference {
        key: TargetKey,
        snapshot: ReferenceSnapshot,
    },
    /// The object is not cached locally; only its identity is known.
    Unresolved(TargetKey),
}

impl MembershipEntry {
    pub fn key(&self) -> TargetKey {
        match self {
            MembershipEntry::Hydrated(object) => object.key(),
            MembershipEntry::Reference { key, .. } => key.clone(),
            MembershipEntry::Unresolved(key) => key.clone(),
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            MembershipEntry::Hydrated(object) => Some(&object.title),
            MembershipEntry::Reference { snapshot, .. } => Some(&snapshot.title),
            MembershipEntry::Unresolved(_) => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, MembershipEntry::Reference { .. })
    }
}

pub type MembershipSnapshot = Arc<Vec<MembershipEntry>>;

/// Ordered list of materialized related objects for one edit session.
pub struct MembershipView {
    resolver: Arc<dyn ObjectResolver>,
    entries: watch::Sender<MembershipSnapshot>,
}

impl MembershipView {
    pub fn new(resolver: Arc<dyn ObjectResolver>) -> Self {
        let (entries, _) = watch::channel(Arc::new(Vec::new()));
        Self { resolver, entries }
    }

    /// Replaces the view wholesale with the projection of `baseline`.
    pub fn initialize(&self, baseline: &[Target]) -> Result<()> {
        let projected = baseline
            .iter()
            .map(|target| self.project(target))
            .collect::<Result<Vec<_>>>()?;
        self.entries.send_replace(Arc::new(projected));
        Ok(())
    }

    /// Appends entries loaded by an external loader, keeping what is shown.
    pub fn extend(&self, items: &[Target]) -> Result<()> {
        let mut projected = self.entries.borrow().to_vec();
        for target in items {
            projected.push(self.project(target)?);
        }
        self.entries.send_replace(Arc::new(projected));
        Ok(())
    }

    pub fn apply_add(&self, target: &Target) -> Result<()> {
        let entry = self.project(target)?;
        let mut next = self.entries.borrow().to_vec();
        next.push(entry);
        self.entries.send_replace(Arc::new(next));
        Ok(())
    }

    /// Removes every entry matching `key` and returns how many were removed.
    pub fn apply_remove(&self, key: &TargetKey) -> usize {
        let current = self.entries.borrow().clone();
        let next: Vec<MembershipEntry> = current
            .iter()
            .filter(|entry| &entry.key() != key)
            .cloned()
            .collect();
        let removed = current.len() - next.len();
        if removed > 0 {
            self.entries.send_replace(Arc::new(next));
        }
        removed
    }

    pub fn snapshot(&self) -> MembershipSnapshot {
        self.entries.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MembershipSnapshot> {
        self.entries.subscribe()
    }

    pub fn contains(&self, key: &TargetKey) -> bool {
        self.entries.borrow().iter().any(|entry| &entry.key() == key)
    }

    pub fn identities(&self) -> BTreeSet<TargetKey> {
        self.entries.borrow().iter().map(MembershipEntry::key).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.send_replace(Arc::new(Vec::new()));
    }

    fn project(&self, target: &Target) -> Result<MembershipEntry> {
        let key = target.key()?;

        if let Some(Payload::Reference(snapshot)) = &target.payload {
            return Ok(MembershipEntry::Reference {
                key,
                snapshot: snapshot.clone(),
            });
        }

        if let Some(object) = self.resolver.resolve_cached(&key.type_name, key.id) {
            return Ok(MembershipEntry::Hydrated(object));
        }

        match &target.payload {
            Some(Payload::Object(object)) => Ok(MembershipEntry::Hydrated(object.clone())),
            _ => Ok(MembershipEntry::Unresolved(key)),
        }
    }
}
