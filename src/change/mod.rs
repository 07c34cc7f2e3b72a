// ============================================================================
// Change Tracking
// ============================================================================
//
// Ordered log of pending relationship-membership intents for one edit
// session. Contradictory intents for the same target cancel each other out,
// so the log holds at most one pending intent per (id, type).
//
// ============================================================================

pub mod intent;
pub mod log;

pub use intent::{Intent, IntentKind};
pub use log::{ChangeLog, IntentOutcome, find_intent, record_intent};
