//! Generator Configuration
//!
//! The configuration file is read once per run. [`GeneratorConfig`] mirrors
//! the file; [`Settings`] is the validated form the pipeline works with,
//! including values derived from `site_id`.

mod loader;

pub use loader::{ConfigLoader, strip_comments};

use std::path::PathBuf;

use haystack_types::{PointMetaMap, parent_name, short_name};
use serde::Deserialize;
use serde_json::Value;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] figment::Error),

    #[error("Missing parameter in config: '{0}'")]
    Missing(String),

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Configuration file as written by the user
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub site_id: String,
    pub building: Option<String>,
    pub campus: Option<String>,
    /// Driver topic prefix, defaults to `devices/<campus>/<building>/`
    pub topic_prefix: Option<String>,
    #[serde(default)]
    pub point_meta_map: PointMetaMap,
    #[serde(default = "default_point_meta_field")]
    pub point_meta_field: String,
    #[serde(default)]
    pub point_name_strategy: PointNameStrategy,
    pub config_template: Option<Value>,
    pub output_dir: Option<PathBuf>,
    pub metadata: Option<MetadataConfig>,
    pub building_power_meter: Option<String>,
    pub power_meter_id: Option<String>,
    pub validate_pairwise_criteria: Option<bool>,
    pub pairwise_criteria_file: Option<PathBuf>,
    #[serde(default = "default_consistency_threshold")]
    pub pairwise_consistency_threshold: f64,
    pub driver_vip: Option<String>,
    pub ilc_agent_vip: Option<String>,
    pub agent_name: Option<String>,
}

fn default_point_meta_field() -> String {
    "miniDis".to_string()
}

fn default_consistency_threshold() -> f64 {
    crate::pairwise::DEFAULT_THRESHOLD
}

/// How a point name is cut out of a topic string
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointNameStrategy {
    /// After the last `/`, then after the last `.` or `:`
    #[default]
    Suffix,
    /// After the last `/` only
    TopicLeaf,
}

/// Where tag metadata comes from
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MetadataConfig {
    Json {
        equip_json: PathBuf,
        points_json: PathBuf,
    },
    Postgres {
        connection_params: ConnectionParams,
        equip_table: String,
        point_table: String,
    },
}

/// Relational connection parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionParams {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub dbname: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// Validated configuration for one run
#[derive(Debug, Clone)]
pub struct Settings {
    /// File the configuration came from, if any
    pub source_path: Option<PathBuf>,
    pub site_id: Option<String>,
    pub building: String,
    pub campus: String,
    pub topic_prefix: Option<String>,
    pub point_meta_map: PointMetaMap,
    pub point_meta_field: String,
    pub point_name_strategy: PointNameStrategy,
    /// Template tree; `Value::Null` when none was configured
    pub template: Value,
    pub output_dir: Option<PathBuf>,
    pub metadata: MetadataConfig,
    pub power_meter: PowerMeterSettings,
    pub pairwise: PairwiseSettings,
    pub driver_vip: Option<String>,
    pub ilc_agent_vip: Option<String>,
    pub agent_name: Option<String>,
}

/// Building power meter overrides
#[derive(Debug, Clone, Default)]
pub struct PowerMeterSettings {
    /// Name used in the meter's device topic
    pub name: Option<String>,
    /// Exact equipment id of the meter
    pub id: Option<String>,
}

/// Pairwise criteria handling
#[derive(Debug, Clone)]
pub struct PairwiseSettings {
    pub validate: bool,
    pub file: Option<PathBuf>,
    pub threshold: f64,
}

impl Settings {
    pub fn from_config(
        config: GeneratorConfig,
        source_path: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let metadata = config
            .metadata
            .ok_or_else(|| ConfigError::Missing("metadata".to_string()))?;

        if config.point_meta_field.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "point_meta_field".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if !(config.pairwise_consistency_threshold > 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "pairwise_consistency_threshold".to_string(),
                reason: "must be a positive number".to_string(),
            });
        }

        let site_id = non_empty(Some(config.site_id));
        let building = non_empty(config.building)
            .or_else(|| site_id.as_deref().map(|s| short_name(s).to_string()))
            .unwrap_or_default();
        let campus = non_empty(config.campus)
            .or_else(|| site_id.as_deref().and_then(parent_name).map(str::to_string))
            .unwrap_or_default();

        let template = config.config_template.unwrap_or(Value::Null);
        // Older configs carry the flag inside the template
        let validate = config
            .validate_pairwise_criteria
            .or_else(|| template.get("validate_pairwise_criteria").and_then(Value::as_bool))
            .unwrap_or(false);

        Ok(Self {
            source_path,
            site_id,
            building,
            campus,
            topic_prefix: non_empty(config.topic_prefix),
            point_meta_map: config.point_meta_map,
            point_meta_field: config.point_meta_field,
            point_name_strategy: config.point_name_strategy,
            template,
            output_dir: config.output_dir,
            metadata,
            power_meter: PowerMeterSettings {
                name: non_empty(config.building_power_meter),
                id: non_empty(config.power_meter_id),
            },
            pairwise: PairwiseSettings {
                validate,
                file: config.pairwise_criteria_file,
                threshold: config.pairwise_consistency_threshold,
            },
            driver_vip: non_empty(config.driver_vip),
            ilc_agent_vip: non_empty(config.ilc_agent_vip),
            agent_name: non_empty(config.agent_name),
        })
    }

    /// `campus/building/` with empty parts left out
    pub fn site_topic_prefix(&self) -> String {
        let mut prefix = String::new();
        for part in [&self.campus, &self.building] {
            if !part.is_empty() {
                prefix.push_str(part);
                prefix.push('/');
            }
        }
        prefix
    }

    /// A required object under `config_template`
    pub fn template_section(&self, key: &str) -> Result<&Value, ConfigError> {
        self.template
            .get(key)
            .filter(|v| !v.is_null())
            .ok_or_else(|| ConfigError::Missing(format!("config_template.{key}")))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}
