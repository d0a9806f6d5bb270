//! Airside economizer configs
//!
//! One config per AHU. Every role in `point_meta_map` is mandatory; an AHU
//! missing any of them is recorded and skipped.

use haystack_types::{DeviceKind, UnmappedDevice, short_name};
use serde_json::Value;
use tracing::{info, warn};

use super::{Pipeline, device_block, set_point_mapping, template};
use crate::assemble::{ConfigAssembler, ManifestEntry, instantiate};
use crate::error::Result;

const DEFAULT_AGENT: &str = "economizer";

pub(super) fn generate(pipeline: &Pipeline<'_>, assembler: &mut ConfigAssembler) -> Result<()> {
    let settings = pipeline.settings;
    let template = template(settings)?;
    let agent = settings.agent_name.as_deref().unwrap_or(DEFAULT_AGENT);
    let roles: Vec<&str> = settings.point_meta_map.keys().map(String::as_str).collect();
    let points = pipeline.points();

    let ahus = pipeline.hierarchy().ahus()?;
    info!("Got {} AHUs", ahus.len());

    for ahu_id in &ahus {
        let ahu = short_name(ahu_id);
        let resolution = points.resolve_all(
            ahu_id,
            DeviceKind::Ahu,
            roles.iter().copied(),
            assembler.diagnostics_mut(),
        )?;

        if !resolution.is_complete() {
            warn!("Skipping {}: missing {:?}", ahu_id, resolution.missing);
            let topics = assembler.diagnostics().observed(ahu_id);
            assembler.diagnostics_mut().record(
                ahu_id.as_str(),
                UnmappedDevice::new(
                    DeviceKind::Ahu,
                    format!(
                        "Unable to find points of type(s): {}",
                        resolution.missing.join(", ")
                    ),
                )
                .with_topic(topics),
            );
            continue;
        }

        let mut config = instantiate(template);
        config.insert("device".to_string(), device_block(settings, ahu, &[]));
        set_point_mapping(
            &mut config,
            resolution
                .found
                .into_iter()
                .map(|(role, name)| (role, Value::String(name))),
        );

        let path = assembler.write_config(&format!("{ahu}.json"), &config)?;
        assembler.register(format!("{agent}-{ahu}"), ManifestEntry::new(path));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::assemble::{CONFIGS_DIR, RunOutcome};
    use crate::families::{Family, generate};
    use crate::testing::{ahu, point, read_json, settings, source};
    use serde_json::json;
    use tempfile::TempDir;

    fn extra() -> serde_json::Value {
        json!({
            "point_meta_map": {
                "supply_fan_status": "SaFanCmd",
                "outdoor_air_temperature": "OaTemp",
                "cool_call": ["ChwVlvPos", "ChwVlvCmd"]
            },
            "config_template": {
                "analysis_name": "Economizer_AIRCx",
                "arguments": {"point_mapping": {}, "device_type": "ahu"}
            }
        })
    }

    fn ahu_points(ahu_id: &str, name: &str) -> Vec<haystack_types::TagRow> {
        vec![
            point(ahu_id, "SaFanCmd", &format!("devices/bldg/{name}/SaFanCmd")),
            point(ahu_id, "OaTemp", &format!("devices/bldg/{name}/OaTemp")),
            point(ahu_id, "ChwVlvCmd", &format!("devices/bldg/{name}/ChwVlvCmd")),
        ]
    }

    #[test]
    fn test_three_ahus_one_incomplete() {
        let dir = TempDir::new().unwrap();
        let mut points = ahu_points("s.b.ahu1", "ahu1");
        points.extend(ahu_points("s.b.ahu3", "ahu3"));
        // ahu2 has no outdoor air temperature or cooling call
        points.push(point("s.b.ahu2", "SaFanCmd", "devices/bldg/ahu2/SaFanCmd"));

        let src = source(vec![ahu("s.b.ahu1"), ahu("s.b.ahu2"), ahu("s.b.ahu3")], points);
        let settings = settings(dir.path(), extra());

        let outcome = generate(Family::Economizer, &settings, &src).unwrap();
        let RunOutcome::PartialFailure(report) = outcome else {
            panic!("expected partial failure");
        };
        assert_eq!(report.configs.len(), 2);
        assert_eq!(report.unmapped, 1);
        assert!(dir.path().join(CONFIGS_DIR).join("ahu1.json").exists());
        assert!(!dir.path().join(CONFIGS_DIR).join("ahu2.json").exists());
        assert!(dir.path().join(CONFIGS_DIR).join("ahu3.json").exists());

        let errors = read_json(&report.diagnostics_file.unwrap());
        assert_eq!(errors["s.b.ahu2"]["type"], "ahu");
        assert_eq!(
            errors["s.b.ahu2"]["error"],
            "Unable to find points of type(s): cool_call, outdoor_air_temperature"
        );
        assert_eq!(
            errors["s.b.ahu2"]["topic_name"],
            json!({"SaFanCmd": "devices/bldg/ahu2/SaFanCmd"})
        );

        let manifest = read_json(&dir.path().join("config_metadata.json"));
        assert_eq!(manifest.as_object().unwrap().len(), 2);
        assert!(manifest.get("economizer-ahu1").is_some());
    }

    #[test]
    fn test_config_shape() {
        let dir = TempDir::new().unwrap();
        let src = source(vec![ahu("s.b.ahu1")], ahu_points("s.b.ahu1", "ahu1"));
        let settings = settings(dir.path(), extra());

        let outcome = generate(Family::Economizer, &settings, &src).unwrap();
        assert!(outcome.is_success());

        let config = read_json(&dir.path().join(CONFIGS_DIR).join("ahu1.json"));
        assert_eq!(
            config,
            json!({
                "analysis_name": "Economizer_AIRCx",
                "device": {
                    "campus": "campus",
                    "building": "bldg",
                    "unit": {"ahu1": {"subdevices": []}}
                },
                "arguments": {
                    "device_type": "ahu",
                    "point_mapping": {
                        "supply_fan_status": "SaFanCmd",
                        "outdoor_air_temperature": "OaTemp",
                        "cool_call": "ChwVlvCmd"
                    }
                }
            })
        );
    }

    #[test]
    fn test_missing_template_is_fatal() {
        let dir = TempDir::new().unwrap();
        let src = source(vec![ahu("s.b.ahu1")], Vec::new());
        let settings = settings(dir.path(), json!({"point_meta_map": {"a": "b"}}));
        assert!(generate(Family::Economizer, &settings, &src).is_err());
    }
}
