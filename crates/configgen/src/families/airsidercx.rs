//! Airside RCx configs
//!
//! One config per AHU that has VAVs. The AHU needs a fan status or fan
//! speed command point; a missing duct static pressure only warns. VAV
//! points are aggregated across the AHU's VAVs and collapsed.

use std::collections::BTreeMap;

use haystack_types::{DeviceKind, PointSet, TopicDetail, UnmappedDevice, short_name};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Pipeline, device_block, set_point_mapping, template};
use crate::assemble::{ConfigAssembler, ManifestEntry, instantiate};
use crate::error::Result;

const DEFAULT_AGENT: &str = "airsidercx";

const AHU_ROLES: [&str; 6] = [
    "fan_status",
    "duct_stcpr",
    "duct_stcpr_stpt",
    "sa_temp",
    "sat_stpt",
    "fan_speedcmd",
];
const VAV_ROLES: [&str; 2] = ["zone_reheat", "zone_damper"];

pub(super) fn generate(pipeline: &Pipeline<'_>, assembler: &mut ConfigAssembler) -> Result<()> {
    let settings = pipeline.settings;
    let template = template(settings)?;
    let agent = settings.agent_name.as_deref().unwrap_or(DEFAULT_AGENT);
    let points = pipeline.points();

    let topology = pipeline.hierarchy().ahus_with_vavs(assembler.diagnostics_mut())?;

    for (ahu_id, vavs) in &topology.ahus {
        if vavs.is_empty() {
            debug!("Skipping {}: no VAVs", ahu_id);
            continue;
        }
        let ahu = short_name(ahu_id);

        let ahu_points = points.resolve_all(
            ahu_id,
            DeviceKind::Ahu,
            AHU_ROLES,
            assembler.diagnostics_mut(),
        )?;
        let found = |role: &str| ahu_points.found.contains_key(role);

        if !found("fan_status") && !found("fan_speedcmd") {
            warn!("Skipping {}: no fan status or fan speed point", ahu_id);
            let topics = assembler.diagnostics().observed(ahu_id);
            assembler.diagnostics_mut().record(
                ahu_id.as_str(),
                UnmappedDevice::new(
                    DeviceKind::Ahu,
                    "Neither fan_status nor fan_speedcmd point is available",
                )
                .with_topic(topics),
            );
            continue;
        }
        if !found("duct_stcpr") {
            let topics = assembler.diagnostics().observed(ahu_id);
            assembler.diagnostics_mut().record(
                ahu_id.as_str(),
                UnmappedDevice::new(DeviceKind::Ahu, "Warning. No point of type duct_stcpr was found")
                    .with_topic(topics),
            );
        }

        let mut aggregated: BTreeMap<&str, PointSet> =
            VAV_ROLES.iter().map(|role| (*role, PointSet::new())).collect();
        for vav_id in vavs {
            let vav_points = points.resolve_all(
                vav_id,
                DeviceKind::Vav,
                VAV_ROLES,
                assembler.diagnostics_mut(),
            )?;
            for (role, name) in vav_points.found {
                if let Some(set) = aggregated.get_mut(role.as_str()) {
                    set.insert(name);
                }
            }
        }

        if aggregated.get("zone_damper").is_none_or(PointSet::is_empty) {
            let per_vav: BTreeMap<String, TopicDetail> = vavs
                .iter()
                .filter_map(|vav_id| {
                    let topics = assembler.diagnostics().observed(vav_id)?;
                    Some((vav_id.clone(), topics))
                })
                .collect();
            // per-VAV topics replace the AHU's own point topics
            assembler.diagnostics_mut().supersede(
                ahu_id.as_str(),
                UnmappedDevice::new(DeviceKind::Vav, "Warning. No point of type zone_damper was found")
                    .with_topic(Some(TopicDetail::Map(per_vav))),
            );
        }

        let subdevices: Vec<&str> = vavs.iter().map(|vav| short_name(vav)).collect();
        let mut mapping: Vec<(String, Value)> = AHU_ROLES
            .iter()
            .map(|role| {
                let name = ahu_points.found.get(*role).cloned().unwrap_or_default();
                (role.to_string(), Value::String(name))
            })
            .collect();
        mapping.extend(
            aggregated
                .into_iter()
                .map(|(role, set)| (role.to_string(), set.collapse())),
        );

        let mut config = instantiate(template);
        config.insert("device".to_string(), device_block(settings, ahu, &subdevices));
        set_point_mapping(&mut config, mapping);

        let path = assembler.write_config(&format!("{ahu}.json"), &config)?;
        assembler.register(format!("{agent}-{ahu}"), ManifestEntry::new(path));
    }

    info!(
        "Processed {} AHUs, {} VAVs without AHU",
        topology.ahus.len(),
        topology.unmapped_vavs.len()
    );
    Ok(())
}
