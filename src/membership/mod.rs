// ============================================================================
// Membership View
// ============================================================================
//
// The list of related objects currently shown for the edited owner. Every
// mutation publishes a new snapshot; readers never observe a partial edit.
//
// ============================================================================

pub mod view;

pub use view::{MembershipEntry, MembershipSnapshot, MembershipView};
