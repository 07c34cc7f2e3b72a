use super::{PendingJoin, PendingJoins};
use crate::change::{ChangeLog, Intent, IntentKind, IntentOutcome};
use crate::config::{ConnectorConfig, EmptyDrainPolicy};
use crate::core::{Extra, OwnerRef, RelError, Result, Target, TargetKey};
use crate::events::{EVENT_CHANNEL_CAPACITY, MappingEvent};
use crate::interface::{JoinOp, MapOptions, MappingRegistry, RelationshipStore};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    Idle,
    AwaitingOwnerCompletion,
    Draining,
}

/// Summary of one drain.
#[derive(Debug, Clone, PartialEq)]
pub struct DrainReport {
    pub mapped: usize,
    pub unmapped: usize,
    /// Distinct target types whose mappings changed, in first-seen order.
    pub touched_types: Vec<String>,
    /// `true` when the completion signal arrived while another drain was running.
    pub skipped: bool,
    pub completed_at: DateTime<Utc>,
}

impl DrainReport {
    fn empty() -> Self {
        Self {
            mapped: 0,
            unmapped: 0,
            touched_types: Vec::new(),
            skipped: false,
            completed_at: Utc::now(),
        }
    }

    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::empty()
        }
    }
}

/// Resolves staged membership changes once the owner has been saved.
pub struct DeferredResolver {
    session_id: Uuid,
    config: ConnectorConfig,
    store: Arc<dyn RelationshipStore>,
    registry: Arc<dyn MappingRegistry>,
    changes: Mutex<ChangeLog>,
    pending: Mutex<PendingJoins>,
    state: Mutex<ResolverState>,
    events: broadcast::Sender<MappingEvent>,
}

impl DeferredResolver {
    pub fn new(
        session_id: Uuid,
        config: ConnectorConfig,
        store: Arc<dyn RelationshipStore>,
        registry: Arc<dyn MappingRegistry>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            session_id,
            config,
            store,
            registry,
            changes: Mutex::new(ChangeLog::new()),
            pending: Mutex::new(PendingJoins::new()),
            state: Mutex::new(ResolverState::Idle),
            events,
        }
    }

    pub fn record_intent(
        &self,
        target: Target,
        kind: IntentKind,
        extra: Extra,
    ) -> Result<IntentOutcome> {
        let outcome = self.changes.lock()?.record(target, kind, extra)?;
        let mut state = self.state.lock()?;
        if *state == ResolverState::Idle {
            *state = ResolverState::AwaitingOwnerCompletion;
        }
        Ok(outcome)
    }

    /// Queues an addition on the owner directly, bypassing the change log.
    pub fn mark_for_addition(&self, relation: &str, target: Target, extra: Extra) -> Result<()> {
        self.pending.lock()?.mark_for_addition(relation, target, extra)?;
        self.await_owner()
    }

    pub fn mark_for_deletion(&self, relation: &str, target: Target) -> Result<()> {
        self.pending.lock()?.mark_for_deletion(relation, target)?;
        self.await_owner()
    }

    pub fn pending_intents(&self) -> Result<Vec<Intent>> {
        Ok(self.changes.lock()?.intents().to_vec())
    }

    /// Kind of the intent staged for `key`, if any.
    pub fn pending_kind(&self, key: &TargetKey) -> Result<Option<IntentKind>> {
        Ok(self.changes.lock()?.pending_kind(key))
    }

    pub fn pending_joins(&self) -> Result<Vec<PendingJoin>> {
        Ok(self.pending.lock()?.iter().cloned().collect())
    }

    pub fn state(&self) -> ResolverState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MappingEvent> {
        self.events.subscribe()
    }

    pub async fn on_owner_created(&self, owner: &OwnerRef) -> Result<DrainReport> {
        self.drain(owner).await
    }

    pub async fn on_owner_updated(&self, owner: &OwnerRef) -> Result<DrainReport> {
        self.drain(owner).await
    }

    /// Drops everything staged without contacting the store.
    ///
    /// Returns the number of discarded intents and pending joins.
    pub fn discard(&self) -> Result<usize> {
        let intents = self.changes.lock()?.take().len();
        let joins = self.pending.lock()?.take().len();
        *self.state.lock()? = ResolverState::Idle;
        Ok(intents + joins)
    }

    /// Resolves every staged intent and pending join against the store.
    ///
    /// Runs on each owner completion signal, whether or not anything is staged.
    pub async fn drain(&self, owner: &OwnerRef) -> Result<DrainReport> {
        {
            let mut state = self.state.lock()?;
            if *state == ResolverState::Draining {
                warn!(
                    session = %self.session_id,
                    owner = %owner,
                    "drain already in flight; signal absorbed"
                );
                return Ok(DrainReport::skipped());
            }
            *state = ResolverState::Draining;
        }

        let span = info_span!("drain", session = %self.session_id, owner = %owner);
        let result = self.run_drain(owner).instrument(span).await;

        let next = match self.changes.lock() {
            Ok(changes) if !changes.is_empty() => ResolverState::AwaitingOwnerCompletion,
            _ => ResolverState::Idle,
        };
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
        result
    }

    async fn run_drain(&self, owner: &OwnerRef) -> Result<DrainReport> {
        owner.require_id()?;
        let batch = self.take_batch(owner)?;

        if batch.is_empty() {
            if self.config.empty_drain == EmptyDrainPolicy::Notify {
                self.emit(MappingEvent::SubtreeChanged);
            }
            info!("nothing to resolve");
            return Ok(DrainReport::empty());
        }

        let (adds, removes): (Vec<PendingJoin>, Vec<PendingJoin>) =
            batch.into_iter().partition(|join| join.kind == IntentKind::Add);
        let map_ops: Vec<JoinOp> = adds.into_iter().map(|join| join.op).collect();
        let unmap_ops: Vec<JoinOp> = removes.into_iter().map(|join| join.op).collect();

        let (mapped, unmapped) = futures::future::join(
            self.map_group(owner, &map_ops),
            self.unmap_group(owner, &unmap_ops),
        )
        .await;

        let mut report = DrainReport::empty();
        let mut succeeded: Vec<&JoinOp> = Vec::new();
        let mut failed: Vec<Target> = Vec::new();
        let mut messages: Vec<String> = Vec::new();

        match mapped {
            Ok(()) => {
                report.mapped = map_ops.len();
                succeeded.extend(map_ops.iter());
            }
            Err(err) => {
                warn!(error = %err, targets = map_ops.len(), "map group failed");
                failed.extend(map_ops.iter().map(|op| op.target.clone()));
                messages.push(format!("map: {}", err));
            }
        }
        match unmapped {
            Ok(()) => {
                report.unmapped = unmap_ops.len();
                succeeded.extend(unmap_ops.iter());
            }
            Err(err) => {
                warn!(error = %err, targets = unmap_ops.len(), "unmap group failed");
                failed.extend(unmap_ops.iter().map(|op| op.target.clone()));
                messages.push(format!("unmap: {}", err));
            }
        }

        for op in &succeeded {
            if !report.touched_types.contains(&op.target.type_name) {
                report.touched_types.push(op.target.type_name.clone());
            }
        }
        for target_type in &report.touched_types {
            self.emit(MappingEvent::MappingChanged {
                target_type: target_type.clone(),
            });
        }
        if !succeeded.is_empty() {
            self.emit(MappingEvent::SubtreeChanged);
        }

        if !failed.is_empty() {
            return Err(RelError::ResolutionFailure {
                failed,
                message: messages.join("; "),
            });
        }

        info!(
            mapped = report.mapped,
            unmapped = report.unmapped,
            types = report.touched_types.len(),
            "drain resolved"
        );
        report.completed_at = Utc::now();
        Ok(report)
    }

    /// Moves the change log into the pending joins and takes the whole queue.
    ///
    /// Nothing here suspends, so no intent can arrive halfway through. When a
    /// relation cannot be resolved the log is left untouched.
    fn take_batch(&self, owner: &OwnerRef) -> Result<Vec<PendingJoin>> {
        let mut changes = self.changes.lock()?;
        let mut pending = self.pending.lock()?;

        let prepared = changes
            .iter()
            .map(|intent| self.prepare(owner, intent))
            .collect::<Result<Vec<_>>>()?;

        changes.clear();
        for join in prepared {
            pending.push(join);
        }
        Ok(pending.take())
    }

    fn prepare(&self, owner: &OwnerRef, intent: &Intent) -> Result<PendingJoin> {
        let relation = match &self.config.mapping {
            Some(relation) => relation.clone(),
            None => self
                .registry
                .canonical_relation(&owner.type_name, &intent.target.type_name)
                .ok_or_else(|| {
                    RelError::NotFound(format!(
                        "no relation between '{}' and '{}'",
                        owner.type_name, intent.target.type_name
                    ))
                })?,
        };
        PendingJoin::new(intent.kind, &relation, intent.target.clone(), intent.extra.clone())
    }

    async fn map_group(&self, owner: &OwnerRef, ops: &[JoinOp]) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let options = MapOptions {
            use_snapshots: self.config.use_snapshots,
        };
        self.store.map_targets(owner, ops, options).await
    }

    async fn unmap_group(&self, owner: &OwnerRef, ops: &[JoinOp]) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        self.store.unmap_targets(owner, ops).await
    }

    fn emit(&self, event: MappingEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    fn await_owner(&self) -> Result<()> {
        let mut state = self.state.lock()?;
        if *state == ResolverState::Idle {
            *state = ResolverState::AwaitingOwnerCompletion;
        }
        Ok(())
    }
}
