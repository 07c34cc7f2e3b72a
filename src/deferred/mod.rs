// ============================================================================
// Deferred Resolution
// ============================================================================
//
// Membership changes staged while the owner is being edited are resolved
// against the relationship store exactly once per owner save:
//
// ```text
// Idle ──intent──> AwaitingOwnerCompletion ──created/updated──> Draining ──> Idle
// ```
//
// The pending batch is taken in one synchronous step, so intents recorded
// while a drain is in flight start a fresh log.
//
// ============================================================================

pub mod pending;
pub mod resolver;

pub use pending::{PendingJoin, PendingJoins};
pub use resolver::{DeferredResolver, DrainReport, ResolverState};
