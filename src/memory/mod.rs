// ============================================================================
// In-Memory Collaborators
// ============================================================================
//
// Working implementations of every collaborator contract, kept entirely in
// process memory. Each store counts the calls it receives and can be told to
// fail, which makes them usable both offline and as test doubles.
//
// ============================================================================

pub mod cache;
pub mod join_store;
pub mod registry;
pub mod relationship_store;

pub use cache::InMemoryObjectCache;
pub use join_store::InMemoryJoinStore;
pub use registry::StaticMappingRegistry;
pub use relationship_store::{InMemoryRelationshipStore, StoreGate};
