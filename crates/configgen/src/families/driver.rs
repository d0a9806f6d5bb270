//! Platform driver configs
//!
//! One file per AHU listing the driver config of the AHU and of each of its
//! VAVs under their device topics. The template's `driver_config.query`
//! carries `{device_id}` and `{obj_name}` placeholders which are filled from
//! the equipment's point rows.

use std::sync::LazyLock;

use haystack_types::{DeviceKind, Diagnostics, TagFilter, TopicDetail, UnmappedDevice, short_name, tag};
use regex::Regex;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{Pipeline, keyed, template};
use crate::assemble::{ConfigAssembler, instantiate};
use crate::config::{ConfigError, Settings};
use crate::error::Result;
use crate::source::{SourceError, TagSource};

const DEFAULT_VIP: &str = "platform.driver";
const UNMAPPED_VAVS_FILE: &str = "unmapped_vavs.json";

/// Object names are only needed when the query selects on them
const OBJECT_NAME_ATTR: &str = "attr_prop_object_name";

static AHU_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\d+\]").expect("valid pattern"));

/// Values substituted into the driver query
#[derive(Debug, Clone, PartialEq, Eq)]
struct DeviceIdentity {
    device_id: String,
    obj_name: String,
    topic: Option<String>,
}

#[derive(Debug)]
enum Lookup {
    Found(DeviceIdentity),
    NoPoints,
    Unparsed(Option<String>),
}

struct DriverJob<'a> {
    source: &'a dyn TagSource,
    template: &'a Value,
    query: &'a str,
    topic_prefix: String,
}

pub(super) fn generate(pipeline: &Pipeline<'_>, assembler: &mut ConfigAssembler) -> Result<()> {
    let settings = pipeline.settings;
    let template = template(settings)?;
    let query = template
        .get("driver_config")
        .and_then(|driver| driver.get("query"))
        .and_then(Value::as_str)
        .ok_or_else(|| ConfigError::Missing("config_template.driver_config.query".to_string()))?;
    let vip = settings.driver_vip.as_deref().unwrap_or(DEFAULT_VIP);

    let job = DriverJob {
        source: pipeline.source,
        template,
        query,
        topic_prefix: topic_prefix(settings),
    };

    let topology = pipeline.hierarchy().ahus_with_vavs(assembler.diagnostics_mut())?;
    for (ahu_id, vavs) in &topology.ahus {
        let ahu = short_name(ahu_id);
        let topic = format!("{}{ahu}", job.topic_prefix);

        let mut entries = Vec::new();
        entries.extend(job.entry(topic, ahu_id, DeviceKind::Ahu, assembler.diagnostics_mut())?);
        for vav_id in vavs {
            let topic = format!("{}{ahu}/{}", job.topic_prefix, short_name(vav_id));
            entries.extend(job.entry(topic, vav_id, DeviceKind::Vav, assembler.diagnostics_mut())?);
        }

        if entries.is_empty() {
            debug!("No driver configs for {}", ahu_id);
            continue;
        }
        assembler.write_config(&format!("{ahu}.json"), &keyed(vip, Value::Array(entries)))?;
    }

    let mut unmapped = Vec::new();
    for vav_id in &topology.unmapped_vavs {
        let topic = format!("{}{}", job.topic_prefix, short_name(vav_id));
        let diagnostics = assembler.diagnostics_mut();
        match job.lookup(vav_id, DeviceKind::Vav)? {
            Lookup::Found(identity) => {
                if let Some(point_topic) = &identity.topic {
                    diagnostics.enrich(vav_id, TopicDetail::Single(point_topic.clone()));
                }
                unmapped.push(job.config_entry(topic, &identity));
            }
            lookup => job.record_failure(vav_id, DeviceKind::Vav, lookup, diagnostics),
        }
    }
    if !unmapped.is_empty() {
        info!("{} VAVs without ahuRef written to {}", unmapped.len(), UNMAPPED_VAVS_FILE);
        assembler.write_error_file(UNMAPPED_VAVS_FILE, &keyed(vip, Value::Array(unmapped)))?;
    }
    Ok(())
}

/// `topic_prefix`, else `devices/<campus>/<building>/`; always ends in `/`
fn topic_prefix(settings: &Settings) -> String {
    let mut prefix = match &settings.topic_prefix {
        Some(prefix) => prefix.clone(),
        None => {
            let mut prefix = "devices".to_string();
            for part in [&settings.campus, &settings.building] {
                if !part.is_empty() {
                    prefix.push('/');
                    prefix.push_str(part);
                }
            }
            prefix
        }
    };
    if !prefix.ends_with('/') {
        prefix.push('/');
    }
    prefix
}

/// BACnet object name embedded in a point topic
fn object_name(topic: &str, kind: DeviceKind) -> Option<String> {
    let leaf = topic.rsplit('/').next().unwrap_or_default();
    match kind {
        DeviceKind::Ahu => AHU_OBJECT
            .find(leaf)
            .map(|m| m.as_str().replace('[', "(").replace(']', ")")),
        _ => leaf
            .split(':')
            .next()
            .filter(|name| !name.is_empty())
            .map(str::to_string),
    }
}

impl DriverJob<'_> {
    fn needs_object_name(&self) -> bool {
        self.query.contains(OBJECT_NAME_ATTR)
    }

    /// First point row (by id) that yields every placeholder value
    fn lookup(&self, equip_id: &str, kind: DeviceKind) -> std::result::Result<Lookup, SourceError> {
        let mut rows = self
            .source
            .list_points(&TagFilter::new().equals(tag::EQUIP_REF, equip_id))?;
        rows.sort_by(|a, b| a.id().cmp(&b.id()));

        let needs_object_name = self.needs_object_name();
        for row in &rows {
            let topic = row.non_empty(tag::TOPIC_NAME);
            let device_id = row
                .non_empty(tag::DEVICE_NAME)
                .or_else(|| topic?.split('/').nth(4).filter(|s| !s.is_empty()));
            let Some(device_id) = device_id else {
                continue;
            };
            let obj_name = if needs_object_name {
                match topic.and_then(|t| object_name(t, kind)) {
                    Some(name) => name,
                    None => continue,
                }
            } else {
                String::new()
            };
            return Ok(Lookup::Found(DeviceIdentity {
                device_id: device_id.to_string(),
                obj_name,
                topic: topic.map(str::to_string),
            }));
        }

        if rows.is_empty() {
            return Ok(Lookup::NoPoints);
        }
        let first_topic = rows
            .iter()
            .find_map(|row| row.non_empty(tag::TOPIC_NAME))
            .map(str::to_string);
        Ok(Lookup::Unparsed(first_topic))
    }

    /// `{"config-name": topic, "config": ...}`, or `None` after recording
    /// why the equipment has no driver config
    fn entry(
        &self,
        topic: String,
        equip_id: &str,
        kind: DeviceKind,
        diagnostics: &mut Diagnostics,
    ) -> Result<Option<Value>> {
        match self.lookup(equip_id, kind)? {
            Lookup::Found(identity) => Ok(Some(self.config_entry(topic, &identity))),
            lookup => {
                self.record_failure(equip_id, kind, lookup, diagnostics);
                Ok(None)
            }
        }
    }

    fn config_entry(&self, topic: String, identity: &DeviceIdentity) -> Value {
        let query = self
            .query
            .replace("{device_id}", &identity.device_id)
            .replace("{obj_name}", &identity.obj_name);
        let mut config = instantiate(self.template);
        if let Some(Value::Object(driver)) = config.get_mut("driver_config") {
            driver.insert("query".to_string(), Value::String(query));
        }
        json!({"config-name": topic, "config": config})
    }

    fn record_failure(
        &self,
        equip_id: &str,
        kind: DeviceKind,
        lookup: Lookup,
        diagnostics: &mut Diagnostics,
    ) {
        let detail = match lookup {
            Lookup::Found(_) => return,
            Lookup::NoPoints => {
                UnmappedDevice::new(kind, format!("Unable to find any points for {equip_id}"))
            }
            Lookup::Unparsed(topic) => UnmappedDevice::new(
                kind,
                "Unable to parse any of the point topic names for device id and/or object name",
            )
            .with_topic(topic.map(TopicDetail::Single)),
        };
        debug!("No driver config for {}: {}", equip_id, detail.error);
        diagnostics.record(equip_id, detail);
    }
}
