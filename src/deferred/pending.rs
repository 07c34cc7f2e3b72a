use crate::change::IntentKind;
use crate::core::{Extra, Result, Target, TargetKey};
use crate::interface::JoinOp;

/// A join operation queued on the owner, with its relation already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingJoin {
    pub kind: IntentKind,
    pub op: JoinOp,
    key: TargetKey,
}

impl PendingJoin {
    pub fn new(kind: IntentKind, relation: &str, target: Target, extra: Extra) -> Result<Self> {
        let key = target.key()?;
        Ok(Self {
            kind,
            op: JoinOp {
                relation: relation.to_string(),
                target,
                extra,
            },
            key,
        })
    }

    pub fn key(&self) -> &TargetKey {
        &self.key
    }

    fn same_slot(&self, relation: &str, key: &TargetKey) -> bool {
        self.op.relation == relation && &self.key == key
    }
}

/// Join operations queued on the owner and resolved after its next save.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingJoins {
    joins: Vec<PendingJoin>,
}

impl PendingJoins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_for_addition(
        &mut self,
        relation: &str,
        target: Target,
        extra: Extra,
    ) -> Result<()> {
        self.push(PendingJoin::new(IntentKind::Add, relation, target, extra)?);
        Ok(())
    }

    pub fn mark_for_deletion(&mut self, relation: &str, target: Target) -> Result<()> {
        self.push(PendingJoin::new(IntentKind::Remove, relation, target, Extra::new())?);
        Ok(())
    }

    /// Queues `join`, dropping an opposite entry for the same relation slot.
    pub fn push(&mut self, join: PendingJoin) {
        let relation = join.op.relation.clone();
        let key = join.key.clone();
        if let Some(index) = self
            .joins
            .iter()
            .position(|p| p.kind == join.kind.opposite() && p.same_slot(&relation, &key))
        {
            self.joins.remove(index);
            return;
        }
        if self
            .joins
            .iter()
            .any(|p| p.kind == join.kind && p.same_slot(&relation, &key))
        {
            return;
        }
        self.joins.push(join);
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingJoin> {
        self.joins.iter()
    }

    pub fn take(&mut self) -> Vec<PendingJoin> {
        std::mem::take(&mut self.joins)
    }
}
