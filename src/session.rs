// ============================================================================
// Edit Session
// ============================================================================
//
// One transient editing surface for one owner. The session owns the change
// log, pending joins and membership view; all of them die with it.
//
// Owner lifecycle:
// ```text
// Unsaved ──begin_save──> Saving ──created──> Saved
//                           ▲                   │
//                           └────begin_save─────┘
// ```
//
// ============================================================================

use crate::change::{Intent, IntentKind, IntentOutcome};
use crate::config::{ConnectorConfig, DEFAULT_MAPPING_RELATION};
use crate::core::{Extra, OwnerRef, Payload, RelError, Result, Target};
use crate::deferred::{DeferredResolver, DrainReport};
use crate::events::MappingEvent;
use crate::interface::{MappingRegistry, ObjectResolver, RelationshipStore};
use crate::membership::MembershipView;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerState {
    Unsaved,
    Saving,
    Saved,
}

impl fmt::Display for OwnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerState::Unsaved => write!(f, "UNSAVED"),
            OwnerState::Saving => write!(f, "SAVING"),
            OwnerState::Saved => write!(f, "SAVED"),
        }
    }
}

pub struct EditSession {
    id: Uuid,
    owner: Mutex<OwnerRef>,
    owner_state: Mutex<OwnerState>,
    config: ConnectorConfig,
    store: Arc<dyn RelationshipStore>,
    cache: Arc<dyn ObjectResolver>,
    view: MembershipView,
    resolver: DeferredResolver,
}

impl EditSession {
    pub fn new(
        owner: OwnerRef,
        config: ConnectorConfig,
        store: Arc<dyn RelationshipStore>,
        registry: Arc<dyn MappingRegistry>,
        cache: Arc<dyn ObjectResolver>,
    ) -> Self {
        let id = Uuid::new_v4();
        let owner_state = if owner.is_persisted() {
            OwnerState::Saved
        } else {
            OwnerState::Unsaved
        };
        let resolver = DeferredResolver::new(id, config.clone(), store.clone(), registry);

        Self {
            id,
            owner: Mutex::new(owner),
            owner_state: Mutex::new(owner_state),
            config,
            store,
            view: MembershipView::new(cache.clone()),
            cache,
            resolver,
        }
    }

    /// Loads the baseline and seeds the default mappings.
    pub async fn open(&self) -> Result<()> {
        let owner = self.owner()?;

        let baseline = match self.config.baseline_relation() {
            Some(relation) if owner.is_persisted() && !self.config.custom_related_loader => {
                self.store.load_baseline(&owner, relation).await?
            }
            _ => Vec::new(),
        };
        if !self.config.custom_related_loader {
            self.view.initialize(&baseline)?;
        }

        for mapping in &self.config.default_mappings {
            let Some(target) = mapping.to_target() else {
                debug!(session = %self.id, "skipping incomplete default mapping");
                continue;
            };
            let target = self.hydrate(target);
            self.resolver
                .mark_for_addition(DEFAULT_MAPPING_RELATION, target.clone(), Extra::new())?;
            self.view.apply_add(&target)?;
        }

        info!(
            session = %self.id,
            owner = %owner,
            baseline = baseline.len(),
            "edit session opened"
        );
        Ok(())
    }

    /// Appends entries loaded by the caller's own loader.
    pub fn set_list_items(&self, items: &[Target]) -> Result<()> {
        self.view.extend(items)
    }

    pub fn add_mappings(&self, targets: &[Target]) -> Result<Vec<IntentOutcome>> {
        targets
            .iter()
            .map(|target| self.add_mapping_with_extra(target.clone(), Extra::new()))
            .collect()
    }

    /// Stages an addition carrying auxiliary join attributes.
    ///
    /// A target already shown in the view with nothing staged for it is a
    /// current member; re-adding it is absorbed without recording an intent.
    pub fn add_mapping_with_extra(&self, target: Target, extra: Extra) -> Result<IntentOutcome> {
        let key = target.key()?;
        if self.view.contains(&key) && self.resolver.pending_kind(&key)?.is_none() {
            debug!(session = %self.id, endpoint = %key, "target already mapped; add absorbed");
            return Ok(IntentOutcome::Duplicate);
        }

        let outcome = self
            .resolver
            .record_intent(target.clone(), IntentKind::Add, extra)?;
        if outcome != IntentOutcome::Duplicate {
            self.view.apply_add(&target)?;
        }
        Ok(outcome)
    }

    pub fn remove_mapping(&self, target: &Target) -> Result<IntentOutcome> {
        let key = target.key()?;
        let outcome = self
            .resolver
            .record_intent(target.clone(), IntentKind::Remove, Extra::new())?;
        self.view.apply_remove(&key);
        Ok(outcome)
    }

    pub fn begin_save(&self) -> Result<()> {
        let mut state = self.owner_state.lock()?;
        if *state == OwnerState::Saving {
            return Err(RelError::InvalidState("owner is already saving".to_string()));
        }
        *state = OwnerState::Saving;
        Ok(())
    }

    /// The owner's save was rejected; staged changes stay in place.
    pub fn save_failed(&self) -> Result<()> {
        let persisted = self.owner()?.is_persisted();
        *self.owner_state.lock()? = if persisted {
            OwnerState::Saved
        } else {
            OwnerState::Unsaved
        };
        Ok(())
    }

    /// The owner's create call returned `id`.
    pub async fn owner_created(&self, id: i64) -> Result<DrainReport> {
        let owner = {
            let mut owner = self.owner.lock()?;
            owner.id = Some(id);
            owner.clone()
        };
        *self.owner_state.lock()? = OwnerState::Saved;
        self.resolver.on_owner_created(&owner).await
    }

    pub async fn owner_updated(&self) -> Result<DrainReport> {
        let owner = self.owner()?;
        *self.owner_state.lock()? = OwnerState::Saved;
        self.resolver.on_owner_updated(&owner).await
    }

    /// Ends the session without saving. Returns how many staged changes were dropped.
    pub fn close(self) -> Result<usize> {
        let discarded = self.resolver.discard()?;
        self.view.clear();
        debug!(session = %self.id, discarded, "edit session closed");
        Ok(discarded)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner(&self) -> Result<OwnerRef> {
        Ok(self.owner.lock()?.clone())
    }

    pub fn owner_state(&self) -> Result<OwnerState> {
        Ok(*self.owner_state.lock()?)
    }

    pub fn view(&self) -> &MembershipView {
        &self.view
    }

    pub fn resolver(&self) -> &DeferredResolver {
        &self.resolver
    }

    pub fn pending_intents(&self) -> Result<Vec<Intent>> {
        self.resolver.pending_intents()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MappingEvent> {
        self.resolver.subscribe()
    }

    fn hydrate(&self, target: Target) -> Target {
        let Some(id) = target.id else {
            return target;
        };
        match self.cache.resolve_cached(&target.type_name, id) {
            Some(object) => target.with_payload(Payload::Object(object)),
            None => target,
        }
    }
}
