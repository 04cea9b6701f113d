//! The relationship engine: planning IN-based eager loads for `include`,
//! and turning a relationship-endpoint write into concrete linkage
//! statements against the owning side of the relationship.

mod eager_load;
mod linkage;

pub use eager_load::{plan_includes, IncludeNode};
pub use linkage::{resolve_relationship_op, LinkageStatement};
