//! Generator Families
//!
//! Every family is the same pipeline (tag source, hierarchy, point
//! resolution, assembly) with a different template shape and a different
//! notion of which points are mandatory. A [`Pipeline`] carries the shared
//! collaborators; each family module contributes one `generate` function.

mod airsidercx;
mod driver;
mod economizer;
mod ilc;

use std::path::PathBuf;

use serde_json::{Map, Value, json};
use tracing::info;

use crate::assemble::{ConfigAssembler, RunOutcome, take_object};
use crate::config::{ConfigError, Settings};
use crate::error::Result;
use crate::resolve::{HierarchyResolver, PointNaming, PointResolver, naming_for};
use crate::source::TagSource;

/// Which configuration set to generate
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Family {
    /// Platform driver configs, one file per AHU
    Driver,
    /// Airside retuning diagnostics, one file per AHU with its VAVs
    #[value(name = "airsidercx")]
    AirsideRcx,
    /// Airside economizer diagnostics, one file per AHU
    Economizer,
    /// Intelligent load control
    Ilc,
}

impl Family {
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Driver => "driver",
            Family::AirsideRcx => "airsidercx",
            Family::Economizer => "economizer",
            Family::Ilc => "ilc",
        }
    }

    /// Output directory used when none is configured
    pub fn default_output_dir(&self, building: &str) -> PathBuf {
        let suffix = match self {
            Family::Driver => "driver_configs",
            Family::AirsideRcx => "airsidercx_configs",
            Family::Economizer => "airside_economizer_configs",
            Family::Ilc => "ILC_configs",
        };
        if building.is_empty() {
            PathBuf::from(suffix)
        } else {
            PathBuf::from(format!("{building}_{suffix}"))
        }
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared collaborators for one run
pub struct Pipeline<'a> {
    pub settings: &'a Settings,
    pub source: &'a dyn TagSource,
    naming: Box<dyn PointNaming>,
}

impl<'a> Pipeline<'a> {
    pub fn new(settings: &'a Settings, source: &'a dyn TagSource) -> Self {
        Self {
            settings,
            source,
            naming: naming_for(settings.point_name_strategy),
        }
    }

    pub fn hierarchy(&self) -> HierarchyResolver<'_> {
        HierarchyResolver::new(self.source)
    }

    pub fn points(&self) -> PointResolver<'_> {
        PointResolver::new(
            self.source,
            self.naming.as_ref(),
            &self.settings.point_meta_field,
            &self.settings.point_meta_map,
        )
    }
}

/// Run one family against an open tag source
pub fn generate(family: Family, settings: &Settings, source: &dyn TagSource) -> Result<RunOutcome> {
    let output_dir = settings
        .output_dir
        .clone()
        .unwrap_or_else(|| family.default_output_dir(&settings.building));
    info!("Generating {} configs", family);

    let mut assembler = ConfigAssembler::new(&output_dir)?;
    let pipeline = Pipeline::new(settings, source);
    match family {
        Family::Driver => driver::generate(&pipeline, &mut assembler)?,
        Family::AirsideRcx => airsidercx::generate(&pipeline, &mut assembler)?,
        Family::Economizer => economizer::generate(&pipeline, &mut assembler)?,
        Family::Ilc => ilc::generate(&pipeline, &mut assembler)?,
    }
    assembler.finish()
}

/// The configured template tree; AHU families cannot run without one
fn template(settings: &Settings) -> std::result::Result<&Value, ConfigError> {
    if settings.template.is_object() {
        Ok(&settings.template)
    } else {
        Err(ConfigError::Missing("config_template".to_string()))
    }
}

/// `device` block of an AHU-level diagnostics config
fn device_block(settings: &Settings, ahu: &str, subdevices: &[&str]) -> Value {
    let mut unit = Map::new();
    unit.insert(ahu.to_string(), json!({"subdevices": subdevices}));
    json!({
        "campus": settings.campus,
        "building": settings.building,
        "unit": unit
    })
}

/// Single-entry object with a runtime key
fn keyed(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

/// Merge entries into `arguments.point_mapping`, creating both if needed
fn set_point_mapping(config: &mut Map<String, Value>, entries: impl IntoIterator<Item = (String, Value)>) {
    let mut arguments = take_object(config, "arguments");
    let mut mapping = take_object(&mut arguments, "point_mapping");
    mapping.extend(entries);
    arguments.insert("point_mapping".to_string(), Value::Object(mapping));
    config.insert("arguments".to_string(), Value::Object(arguments));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_dirs() {
        assert_eq!(
            Family::Driver.default_output_dir("bldg"),
            PathBuf::from("bldg_driver_configs")
        );
        assert_eq!(
            Family::Economizer.default_output_dir(""),
            PathBuf::from("airside_economizer_configs")
        );
        assert_eq!(Family::Ilc.default_output_dir("b90"), PathBuf::from("b90_ILC_configs"));
    }

    #[test]
    fn test_family_names() {
        use clap::ValueEnum;
        let names: Vec<String> = Family::value_variants()
            .iter()
            .filter_map(|f| f.to_possible_value().map(|v| v.get_name().to_string()))
            .collect();
        assert_eq!(names, ["driver", "airsidercx", "economizer", "ilc"]);
        assert_eq!(Family::AirsideRcx.to_string(), "airsidercx");
    }

    #[test]
    fn test_set_point_mapping_keeps_existing_arguments() {
        let mut config = crate::assemble::instantiate(&json!({
            "arguments": {"sensitivity": "all", "point_mapping": {"fan_status": ""}}
        }));
        set_point_mapping(&mut config, [("fan_status".to_string(), json!("SaFanCmd"))]);
        assert_eq!(
            Value::Object(config),
            json!({"arguments": {"sensitivity": "all", "point_mapping": {"fan_status": "SaFanCmd"}}})
        );
    }
}
