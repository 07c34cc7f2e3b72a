use super::{JoinRecord, PolymorphicJoinResolver};
use crate::config::SelectorConfig;
use crate::core::{OwnerRef, RelError, RelatedObject, Result, TargetKey};
use crate::events::{EVENT_CHANNEL_CAPACITY, JoinEvent};
use crate::interface::{JoinStore, ObjectResolver};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{debug, info, warn};

/// One row of the displayed "active" list.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveEntry {
    /// `None` when the referenced option could not be resolved.
    pub option: Option<RelatedObject>,
    pub join: JoinRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToggleOutcome {
    /// The store already matched the requested state.
    Unchanged,
    Created(JoinRecord),
    /// An unsaved join was dropped locally without contacting the store.
    DraftDiscarded,
    Destroyed(JoinRecord),
}

/// Immediate-mode selector over the joins of one persisted owner.
pub struct LiveJoinReconciler {
    owner: TargetKey,
    config: SelectorConfig,
    addressing: PolymorphicJoinResolver,
    store: Arc<dyn JoinStore>,
    resolver: Arc<dyn ObjectResolver>,
    options: watch::Sender<Arc<Vec<RelatedObject>>>,
    joins: watch::Sender<Arc<Vec<JoinRecord>>>,
    active: watch::Sender<Arc<Vec<ActiveEntry>>>,
    events: broadcast::Sender<JoinEvent>,
    toggle_lock: Mutex<()>,
    data_changed: AtomicBool,
}

impl LiveJoinReconciler {
    pub fn new(
        owner: &OwnerRef,
        config: SelectorConfig,
        store: Arc<dyn JoinStore>,
        resolver: Arc<dyn ObjectResolver>,
    ) -> Result<Self> {
        let owner = TargetKey::new(owner.require_id()?, owner.type_name.clone());
        let addressing = PolymorphicJoinResolver::from_config(&config)?;
        let (options, _) = watch::channel(Arc::new(Vec::new()));
        let (joins, _) = watch::channel(Arc::new(Vec::new()));
        let (active, _) = watch::channel(Arc::new(Vec::new()));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            owner,
            config,
            addressing,
            store,
            resolver,
            options,
            joins,
            active,
            events,
            toggle_lock: Mutex::new(()),
            data_changed: AtomicBool::new(false),
        })
    }

    /// Fetches the option list and the owner's joins, replacing both.
    pub async fn load(&self) -> Result<()> {
        let join_query = self
            .addressing
            .owner_query(&self.owner, &self.config.join_query);
        let (options, joins) = futures::future::try_join(
            self.store.find_options(&self.config.option_query),
            self.store.find_joins(&join_query),
        )
        .await?;

        debug!(
            owner = %self.owner,
            options = options.len(),
            joins = joins.len(),
            "selector loaded"
        );
        self.options.send_replace(Arc::new(options));
        self.replace_joins(joins).await;
        Ok(())
    }

    /// Applies a checkbox toggle for `option`.
    ///
    /// Toggles are serialized: a second toggle waits for the first round trip.
    pub async fn toggle_option(&self, option: &TargetKey, checked: bool) -> Result<ToggleOutcome> {
        let _guard = self.toggle_lock.lock().await;
        let existing = self.match_join(option);

        match (checked, existing) {
            (true, Some(join)) if !join.is_new() => Ok(ToggleOutcome::Unchanged),
            (true, Some(draft)) => self.persist(draft).await,
            (true, None) => {
                let draft = self.addressing.build(option, &self.owner);
                self.persist(draft).await
            }
            (false, None) => Ok(ToggleOutcome::Unchanged),
            (false, Some(draft)) if draft.is_new() => {
                let remaining = self
                    .joins()
                    .iter()
                    .filter(|join| !(join.is_new() && self.addressing.matches(option, join)))
                    .cloned()
                    .collect();
                self.replace_joins(remaining).await;
                debug!(option = %option, "discarded unsaved join");
                Ok(ToggleOutcome::DraftDiscarded)
            }
            (false, Some(join)) => self.destroy(join).await,
        }
    }

    /// The join in the current list referencing `option`, if any.
    pub fn match_join(&self, option: &TargetKey) -> Option<JoinRecord> {
        self.joins
            .borrow()
            .iter()
            .find(|join| self.addressing.matches(option, join))
            .cloned()
    }

    /// Replaces the authoritative join list and rebuilds the active list.
    pub async fn replace_joins(&self, joins: Vec<JoinRecord>) {
        let joins = Arc::new(joins);
        self.joins.send_replace(joins.clone());
        self.rebuild_active(&joins).await;
    }

    pub fn joins(&self) -> Arc<Vec<JoinRecord>> {
        self.joins.borrow().clone()
    }

    pub fn join_count(&self) -> usize {
        self.joins.borrow().len()
    }

    pub fn subscribe_joins(&self) -> watch::Receiver<Arc<Vec<JoinRecord>>> {
        self.joins.subscribe()
    }

    pub fn active(&self) -> Arc<Vec<ActiveEntry>> {
        self.active.borrow().clone()
    }

    pub fn subscribe_active(&self) -> watch::Receiver<Arc<Vec<ActiveEntry>>> {
        self.active.subscribe()
    }

    pub fn options(&self) -> Arc<Vec<RelatedObject>> {
        self.options.borrow().clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<JoinEvent> {
        self.events.subscribe()
    }

    /// Whether any toggle changed the store since the selector was created.
    pub fn data_changed(&self) -> bool {
        self.data_changed.load(Ordering::SeqCst)
    }

    async fn persist(&self, draft: JoinRecord) -> Result<ToggleOutcome> {
        match self.store.create(&draft).await {
            Ok(saved) => {
                let mut next: Vec<JoinRecord> = self
                    .joins()
                    .iter()
                    .filter(|join| **join != draft)
                    .cloned()
                    .collect();
                next.push(saved.clone());
                self.replace_joins(next).await;
                self.data_changed.store(true, Ordering::SeqCst);
                let _ = self.events.send(JoinEvent::Created(saved.clone()));
                info!(owner = %self.owner, join = ?saved.id, "join created");
                Ok(ToggleOutcome::Created(saved))
            }
            Err(err) => {
                // Keep the unsaved join so it can be retried or discarded.
                let current = self.joins();
                if !current.contains(&draft) {
                    let mut next = current.to_vec();
                    next.push(draft);
                    self.replace_joins(next).await;
                }
                warn!(owner = %self.owner, error = %err, "join create failed");
                Err(err)
            }
        }
    }

    async fn destroy(&self, join: JoinRecord) -> Result<ToggleOutcome> {
        let fresh = match self.store.refresh(&join).await {
            Ok(fresh) => fresh,
            Err(RelError::NotFound(_)) => return self.forget(&join).await,
            Err(err) => return Err(err),
        };
        if fresh != join {
            let next = self
                .joins()
                .iter()
                .map(|current| if current.id == join.id { fresh.clone() } else { current.clone() })
                .collect();
            self.replace_joins(next).await;
        }

        match self.store.destroy(&fresh).await {
            Ok(()) => {}
            Err(RelError::NotFound(_)) => return self.forget(&fresh).await,
            Err(err) => {
                warn!(owner = %self.owner, join = ?fresh.id, error = %err, "join destroy failed");
                return Err(err);
            }
        }

        let next = self
            .joins()
            .iter()
            .filter(|current| current.id != fresh.id)
            .cloned()
            .collect();
        self.replace_joins(next).await;
        self.data_changed.store(true, Ordering::SeqCst);
        let _ = self.events.send(JoinEvent::Destroyed(fresh.clone()));
        info!(owner = %self.owner, join = ?fresh.id, "join destroyed");
        Ok(ToggleOutcome::Destroyed(fresh))
    }

    /// Drops a join the store no longer has; the option is already unchecked there.
    async fn forget(&self, gone: &JoinRecord) -> Result<ToggleOutcome> {
        let next = self
            .joins()
            .iter()
            .filter(|current| current.id != gone.id)
            .cloned()
            .collect();
        self.replace_joins(next).await;
        debug!(owner = %self.owner, join = ?gone.id, "join already deleted; dropped from list");
        Ok(ToggleOutcome::Unchanged)
    }

    async fn rebuild_active(&self, joins: &[JoinRecord]) {
        let mut entries = Vec::with_capacity(joins.len());
        for join in joins {
            let option = match self.addressing.option_key(join) {
                Some(key) => self.resolve_option(&key).await,
                None => None,
            };
            entries.push(ActiveEntry {
                option,
                join: join.clone(),
            });
        }
        self.active.send_replace(Arc::new(entries));
    }

    async fn resolve_option(&self, key: &TargetKey) -> Option<RelatedObject> {
        if let Some(object) = self.resolver.resolve_cached(&key.type_name, key.id) {
            return Some(object);
        }
        match self.resolver.fetch(&key.type_name, key.id).await {
            Ok(object) => object,
            Err(err) => {
                warn!(option = %key, error = %err, "could not resolve option");
                None
            }
        }
    }
}
