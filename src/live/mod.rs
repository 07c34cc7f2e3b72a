// ============================================================================
// Live Join Reconciliation
// ============================================================================
//
// Immediate-mode membership editing: every checkbox toggle creates or
// destroys a join record right away. The authoritative join list is held as
// a snapshot and replaced wholesale; the displayed "active" list is rebuilt
// from it after every change.
//
// ============================================================================

pub mod addressing;
pub mod join;
pub mod reconciler;

pub use addressing::{Addressing, PolymorphicJoinResolver};
pub use join::JoinRecord;
pub use reconciler::{ActiveEntry, LiveJoinReconciler, ToggleOutcome};
