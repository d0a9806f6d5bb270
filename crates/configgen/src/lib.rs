//! Haystack Config Generator
//!
//! Turns Haystack-tagged equipment metadata into deployable agent
//! configuration sets:
//! - Tag sources over static JSON documents or a relational store
//! - Equipment hierarchy and point-role resolution
//! - Template instantiation with longest-first point substitution
//! - Per-family assembly with a run-wide unmapped-device report
//! - Consistency checks for AHP pairwise criteria

pub mod assemble;
pub mod config;
pub mod error;
pub mod families;
pub mod pairwise;
pub mod resolve;
pub mod source;

#[cfg(test)]
mod testing;

pub use assemble::{RunOutcome, RunReport};
pub use config::{ConfigError, ConfigLoader, Settings};
pub use error::{ConfigGenError, Result};
pub use families::Family;
pub use source::{SourceError, TagSource};

/// Open the configured metadata source and generate one family
pub fn run(family: Family, settings: &Settings) -> Result<RunOutcome> {
    let source = source::open(settings)?;
    families::generate(family, settings, source.as_ref())
}
