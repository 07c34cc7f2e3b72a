use crate::core::{Extra, OwnerRef, RelatedObject, RelationKey, Result, Target};
use crate::live::JoinRecord;
use async_trait::async_trait;

/// Lookup of related objects by identity.
///
/// `resolve_cached` must not suspend: it only consults objects that are already
/// materialized locally. `fetch` may go to the backing store.
#[async_trait]
pub trait ObjectResolver: Send + Sync {
    fn resolve_cached(&self, type_name: &str, id: i64) -> Option<RelatedObject>;

    async fn fetch(&self, type_name: &str, id: i64) -> Result<Option<RelatedObject>>;
}

/// Which named relation connects two concrete types.
pub trait MappingRegistry: Send + Sync {
    fn canonical_relation(&self, owner_type: &str, target_type: &str) -> Option<RelationKey>;
}

/// One map or unmap request handed to the relationship store.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOp {
    pub relation: RelationKey,
    pub target: Target,
    pub extra: Extra,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapOptions {
    /// Map reference-type targets through their snapshot rather than the live object.
    pub use_snapshots: bool,
}

/// Batch relationship store used by the deferred path.
///
/// Each batch call succeeds or fails as a unit from the caller's perspective.
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    async fn load_baseline(&self, owner: &OwnerRef, relation: &str) -> Result<Vec<Target>>;

    async fn map_targets(
        &self,
        owner: &OwnerRef,
        ops: &[JoinOp],
        options: MapOptions,
    ) -> Result<()>;

    async fn unmap_targets(&self, owner: &OwnerRef, ops: &[JoinOp]) -> Result<()>;
}

/// Record-level join store used by the live selector.
#[async_trait]
pub trait JoinStore: Send + Sync {
    async fn find_options(&self, query: &Extra) -> Result<Vec<RelatedObject>>;

    async fn find_joins(&self, query: &Extra) -> Result<Vec<JoinRecord>>;

    /// Persists a new join and returns the stored version (with its id).
    async fn create(&self, join: &JoinRecord) -> Result<JoinRecord>;

    /// Re-reads a persisted join.
    async fn refresh(&self, join: &JoinRecord) -> Result<JoinRecord>;

    async fn destroy(&self, join: &JoinRecord) -> Result<()>;
}
