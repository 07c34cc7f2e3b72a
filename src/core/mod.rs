pub mod error;
pub mod types;

pub use error::{RelError, Result};
pub use types::{
    Extra, OwnerRef, Payload, ReferenceSnapshot, RelatedObject, RelationKey, Target, TargetKey,
};
