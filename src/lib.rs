// ============================================================================
// relsync Library
// ============================================================================
//
// Many-to-many membership editing for owners that may not exist yet.
//
// - Deferred path: `EditSession` stages add/remove intents, shows them in a
//   `MembershipView`, and resolves them through a `RelationshipStore` once
//   the owner's save completes.
// - Live path: `LiveJoinReconciler` creates and destroys join records as
//   soon as the user toggles an option.
//
// ============================================================================

pub mod core;
pub mod change;
pub mod config;
pub mod deferred;
pub mod events;
pub mod interface;
pub mod live;
pub mod membership;
pub mod memory;
pub mod session;

// Re-export main types for convenience
pub use crate::core::{
    Extra, OwnerRef, Payload, ReferenceSnapshot, RelError, RelatedObject, RelationKey, Result,
    Target, TargetKey,
};
pub use change::{ChangeLog, Intent, IntentKind, IntentOutcome, find_intent, record_intent};
pub use config::{
    ConnectorConfig, DEFAULT_MAPPING_RELATION, DefaultMapping, EmptyDrainPolicy, SelectorConfig,
};
pub use deferred::{DeferredResolver, DrainReport, PendingJoin, PendingJoins, ResolverState};
pub use events::{JoinEvent, MappingEvent};
pub use interface::{
    JoinOp, JoinStore, MapOptions, MappingRegistry, ObjectResolver, RelationshipStore,
};
pub use live::{
    ActiveEntry, Addressing, JoinRecord, LiveJoinReconciler, PolymorphicJoinResolver,
    ToggleOutcome,
};
pub use membership::{MembershipEntry, MembershipView};
pub use session::{EditSession, OwnerState};
