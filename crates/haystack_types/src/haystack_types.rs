//! Haystack Types - Data model for tag-based equipment metadata
//!
//! Pure data structures shared by the config generators: tag rows and the
//! predicates used to select them, equipment-id projections, point-set
//! collapsing and the unmapped-device diagnostics collector. Nothing in this
//! crate performs I/O.

mod diagnostics;
mod equipment;
mod points;
mod tags;

pub use diagnostics::*;
pub use equipment::*;
pub use points::*;
pub use tags::*;
