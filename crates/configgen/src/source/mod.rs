//! Metadata Sources
//!
//! A [`TagSource`] answers two questions, "which equipment rows match" and
//! "which point rows match", for a [`TagFilter`]. Two implementations exist:
//! static JSON documents loaded once, and a relational store queried per
//! call. Equipment queries are narrowed to the configured site; point
//! queries are always scoped through `equipRef` by their callers.

mod json;
#[cfg(feature = "postgres")]
mod postgres;

pub use json::JsonTagSource;
#[cfg(feature = "postgres")]
pub use postgres::PostgresTagSource;

use std::path::PathBuf;

use haystack_types::{TagFilter, TagRow};

use crate::config::{MetadataConfig, Settings};

/// Error type for metadata access
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to read metadata document {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid metadata document {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid table name '{0}'")]
    InvalidIdentifier(String),

    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to start database runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("Relational metadata requires the 'postgres' feature")]
    Unsupported,
}

/// Read access to equipment and point tag rows
pub trait TagSource {
    /// Equipment rows matching `filter`
    fn list_equipment(&self, filter: &TagFilter) -> Result<Vec<TagRow>, SourceError>;

    /// Point rows matching `filter`
    fn list_points(&self, filter: &TagFilter) -> Result<Vec<TagRow>, SourceError>;
}

/// Open the source described by the configuration
pub fn open(settings: &Settings) -> Result<Box<dyn TagSource>, SourceError> {
    let site_id = settings.site_id.clone();
    match &settings.metadata {
        MetadataConfig::Json {
            equip_json,
            points_json,
        } => Ok(Box::new(JsonTagSource::open(equip_json, points_json, site_id)?)),
        #[cfg(feature = "postgres")]
        MetadataConfig::Postgres {
            connection_params,
            equip_table,
            point_table,
        } => Ok(Box::new(PostgresTagSource::connect(
            connection_params,
            equip_table,
            point_table,
            site_id,
        )?)),
        #[cfg(not(feature = "postgres"))]
        MetadataConfig::Postgres { .. } => Err(SourceError::Unsupported),
    }
}

/// Equipment filter with the site scope applied
fn scoped(filter: &TagFilter, site_id: Option<&str>) -> TagFilter {
    match site_id {
        Some(site) => filter.clone().equals(haystack_types::tag::SITE_REF, site),
        None => filter.clone(),
    }
}
