//! Intelligent load control configs
//!
//! Produces, in order: the pairwise criteria matrix (validated first when
//! configured), `ilc.config` with the building power meter, and the
//! per-device control and criteria configs keyed by VAV topic.
//!
//! A missing power meter, an inconsistent criteria matrix or an incomplete
//! VAV is recorded and the remaining outputs are still produced.

use std::path::{Path, PathBuf};

use haystack_types::{DeviceKind, UnmappedDevice, short_name, tag};
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use super::{Pipeline, keyed};
use crate::assemble::{ConfigAssembler, ManifestEntry, Substitution, instantiate, overlay, take_object};
use crate::config::{ConfigError, Settings};
use crate::error::{ConfigGenError, Result};
use crate::pairwise::{self, PairwiseError};

const DEFAULT_VIP: &str = "platform.ilc";
const POWER_ROLE: &str = "WholeBuildingPower";

/// Diagnostics keys that are not equipment ids
const POWER_METER_KEY: &str = "building_power_meter";
const PAIRWISE_KEY: &str = "pairwise_criteria";

/// Criteria members that are not operations
const NON_OPERATIONS: [&str; 2] = ["room_type", "device_topic"];

struct IlcJob<'a> {
    settings: &'a Settings,
    device_type: &'a str,
    vip: &'a str,
}

pub(super) fn generate(pipeline: &Pipeline<'_>, assembler: &mut ConfigAssembler) -> Result<()> {
    let settings = pipeline.settings;
    let device_type = settings
        .template
        .get("device_type")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ConfigError::Missing("config_template.device_type".to_string()))?;
    if !settings.point_meta_map.contains_key(POWER_ROLE) {
        return Err(ConfigError::Missing(format!("point_meta_map.{POWER_ROLE}")).into());
    }
    let control_template = settings.template_section("control_config")?;
    let criteria_template = settings.template_section("criteria_config")?;

    let criteria_file = criteria_file(settings, device_type);
    if !criteria_file.is_file() {
        return Err(ConfigGenError::PairwiseFileNotFound {
            device_type: device_type.to_string(),
            path: criteria_file,
        });
    }

    let job = IlcJob {
        settings,
        device_type,
        vip: settings.ilc_agent_vip.as_deref().unwrap_or(DEFAULT_VIP),
    };
    job.pairwise_config(&criteria_file, assembler)?;
    job.ilc_config(pipeline, assembler)?;
    job.device_configs(pipeline, control_template, criteria_template, assembler)?;
    Ok(())
}

/// Configured criteria file, else `pairwise_criteria_<device_type>.json`.
/// Relative paths are taken from the configuration file's directory.
fn criteria_file(settings: &Settings, device_type: &str) -> PathBuf {
    let file = settings
        .pairwise
        .file
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("pairwise_criteria_{device_type}.json")));
    match settings.source_path.as_deref().and_then(Path::parent) {
        Some(dir) if file.is_relative() => dir.join(file),
        _ => file,
    }
}

impl IlcJob<'_> {
    fn pairwise_config(&self, path: &Path, assembler: &mut ConfigAssembler) -> Result<()> {
        if self.settings.pairwise.validate {
            let invalid = |source: PairwiseError| ConfigGenError::Pairwise {
                path: path.to_path_buf(),
                source,
            };
            let doc = pairwise::load(path).map_err(invalid)?;
            let sections = pairwise::criteria_sections(&doc).map_err(invalid)?;

            let threshold = self.settings.pairwise.threshold;
            let mut failures = Vec::new();
            for (state, matrix) in &sections {
                let sums = pairwise::column_sums(matrix);
                let result = pairwise::validate(matrix, &sums, threshold);
                if result.consistent {
                    info!("Pairwise criteria '{}' consistent (ratio {:.4})", state, result.ratio);
                } else {
                    warn!(
                        "Pairwise criteria '{}' inconsistent: labels {:?} matrix {:?} column sums {:?} ratio {:.4}",
                        state,
                        matrix.labels(),
                        matrix.cells(),
                        sums,
                        result.ratio
                    );
                    failures.push(format!("{state} ratio {:.4}", result.ratio));
                }
            }

            if !failures.is_empty() {
                assembler.diagnostics_mut().record(
                    PAIRWISE_KEY,
                    UnmappedDevice::new(
                        DeviceKind::PairwiseCriteria,
                        format!(
                            "Validation of pairwise criteria file {} failed. Inconsistency ratio \
                             above {threshold}: {}",
                            path.display(),
                            failures.join(", ")
                        ),
                    ),
                );
                return Ok(());
            }
        }

        let file_name = format!("{}_criteria_matrix.json", self.device_type);
        let copied = assembler.copy_config(path, &file_name)?;
        assembler.register(self.vip, ManifestEntry::named(file_name, copied));
        Ok(())
    }

    fn ilc_config(&self, pipeline: &Pipeline<'_>, assembler: &mut ConfigAssembler) -> Result<()> {
        let settings = self.settings;
        let configured = settings.power_meter.id.as_deref();

        let Some(meter_id) = pipeline.hierarchy().power_meter(configured)? else {
            let error = match configured {
                Some(id) => format!("Unable to locate building power meter using id '{id}'"),
                None => format!(
                    "Unable to locate building power meter using the tag '{}'",
                    tag::SITE_METER
                ),
            };
            warn!("{}", error);
            assembler
                .diagnostics_mut()
                .record(POWER_METER_KEY, UnmappedDevice::new(DeviceKind::PowerMeter, error));
            return Ok(());
        };

        let point = pipeline.points().resolve(
            &meter_id,
            DeviceKind::PowerMeter,
            POWER_ROLE,
            assembler.diagnostics_mut(),
        )?;
        let Some(point) = point else {
            // an ambiguous match is already on record
            if !assembler.diagnostics().contains(&meter_id) {
                let candidates = pipeline
                    .points()
                    .candidates(POWER_ROLE)
                    .map(ToString::to_string)
                    .unwrap_or_default();
                let topics = assembler.diagnostics().observed(&meter_id);
                assembler.diagnostics_mut().record(
                    meter_id.as_str(),
                    UnmappedDevice::new(
                        DeviceKind::PowerMeter,
                        format!("Unable to locate building power point using the metadata {candidates}"),
                    )
                    .with_topic(topics),
                );
            }
            return Ok(());
        };

        let meter_name = settings
            .power_meter
            .name
            .clone()
            .unwrap_or_else(|| short_name(&meter_id).to_string());

        let mut config = self.base_ilc_config();
        if let Some(extra) = settings.template.get("ilc_config") {
            overlay(&mut config, extra);
        }
        let mut power_meter = take_object(&mut config, "power_meter");
        power_meter.insert(
            "device_topic".to_string(),
            Value::String(format!("{}{meter_name}", settings.site_topic_prefix())),
        );
        power_meter.insert("point".to_string(), Value::String(point));
        config.insert("power_meter".to_string(), Value::Object(power_meter));

        let path = assembler.write_config("ilc.config", &config)?;
        assembler.register(self.vip, ManifestEntry::named("config", path));
        Ok(())
    }

    fn base_ilc_config(&self) -> Map<String, Value> {
        let device_type = self.device_type;
        instantiate(&json!({
            "campus": self.settings.campus,
            "building": self.settings.building,
            "power_meter": {
                "device_topic": "",
                "point": ""
            },
            "application_category": "Load Control",
            "application_name": "Intelligent Load Control",
            "clusters": [
                {
                    "device_control_config": format!("config://{device_type}_control.config"),
                    "device_criteria_config": format!("config://{device_type}_criteria.config"),
                    "pairwise_criteria_config": format!("config://{device_type}_criteria_matrix.json"),
                    "cluster_priority": 1.0
                }
            ]
        }))
    }

    fn device_configs(
        &self,
        pipeline: &Pipeline<'_>,
        control_template: &Value,
        criteria_template: &Value,
        assembler: &mut ConfigAssembler,
    ) -> Result<()> {
        let settings = self.settings;
        let points = pipeline.points();
        let roles: Vec<&str> = settings
            .point_meta_map
            .keys()
            .map(String::as_str)
            .filter(|role| *role != POWER_ROLE)
            .collect();
        let prefix = settings.site_topic_prefix();

        let vavs = pipeline.hierarchy().vavs_with_ahu()?;
        let mut control = Map::new();
        let mut criteria = Map::new();

        for (vav_id, ahu_id) in &vavs {
            let resolution = points.resolve_all(
                vav_id,
                DeviceKind::Vav,
                roles.iter().copied(),
                assembler.diagnostics_mut(),
            )?;
            if !resolution.is_complete() {
                for role in &resolution.missing {
                    let candidates = points
                        .candidates(role)
                        .map(ToString::to_string)
                        .unwrap_or_default();
                    assembler.diagnostics_mut().record(
                        vav_id.as_str(),
                        UnmappedDevice::new(
                            DeviceKind::Vav,
                            format!(
                                "Unable to find point of type {role} using metadata field {} and \
                                 configured point mapping {candidates}",
                                points.meta_field()
                            ),
                        ),
                    );
                }
                warn!("Skipping {}: missing {:?}", vav_id, resolution.missing);
                continue;
            }

            let vav = short_name(vav_id);
            let vav_topic = match ahu_id {
                Some(ahu) => format!("{}/{vav}", short_name(ahu)),
                None => vav.to_string(),
            };
            let device_topic = format!("{prefix}{vav_topic}");
            let subst = Substitution::new(&resolution.found);

            control.insert(
                vav_topic.clone(),
                keyed(vav, control_config(control_template, &device_topic, &subst)),
            );
            criteria.insert(
                vav_topic,
                keyed(vav, criteria_config(criteria_template, &device_topic, &subst)),
            );
        }

        info!("Generated control settings for {} of {} VAVs", control.len(), vavs.len());
        for (kind, configs) in [("control", control), ("criteria", criteria)] {
            if configs.is_empty() {
                continue;
            }
            let file_name = format!("{}_{kind}.config", self.device_type);
            let path = assembler.write_config(&file_name, &configs)?;
            assembler.register(self.vip, ManifestEntry::named(file_name, path));
        }
        Ok(())
    }
}

/// Control settings with `curtail_settings.point` and every device status
/// state's arguments and condition rewritten to concrete point names
fn control_config(template: &Value, device_topic: &str, subst: &Substitution) -> Value {
    let mut config = instantiate(template);
    config.insert("device_topic".to_string(), Value::String(device_topic.to_string()));

    if let Some(Value::Object(curtail)) = config.get_mut("curtail_settings") {
        if let Some(point) = curtail.get_mut("point") {
            subst.apply_value(point);
        }
    }
    if let Some(Value::Object(states)) = config.get_mut("device_status") {
        for state in states.values_mut() {
            let Value::Object(state) = state else {
                continue;
            };
            for key in ["device_status_args", "condition"] {
                if let Some(value) = state.get_mut(key) {
                    subst.apply_value(value);
                }
            }
        }
    }
    Value::Object(config)
}

/// Criteria with every operation's `operation` and `operation_args`
/// rewritten to concrete point names
fn criteria_config(template: &Value, device_topic: &str, subst: &Substitution) -> Value {
    let mut config = Map::new();
    overlay(&mut config, template);
    config.insert("device_topic".to_string(), Value::String(device_topic.to_string()));

    for (key, value) in config.iter_mut() {
        if NON_OPERATIONS.contains(&key.as_str()) {
            continue;
        }
        let Value::Object(criterion) = value else {
            continue;
        };
        for field in ["operation", "operation_args"] {
            if let Some(value) = criterion.get_mut(field) {
                subst.apply_value(value);
            }
        }
    }
    Value::Object(config)
}
