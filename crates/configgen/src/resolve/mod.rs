//! Entity Resolution
//!
//! [`HierarchyResolver`] answers "which equipment exists and how is it
//! connected"; [`PointResolver`] answers "which concrete point plays this
//! role on that equipment".

mod hierarchy;
mod point;

pub use hierarchy::{HierarchyResolver, Topology};
pub use point::{
    PointNaming, PointResolver, RoleResolution, SuffixPointNaming, TopicLeafNaming, naming_for,
};
