//! In-memory metadata fixtures shared by unit tests

use std::path::Path;

use haystack_types::{TagRow, tag};
use serde_json::{Value, json};

use crate::config::{ConfigLoader, Settings};
use crate::source::JsonTagSource;

pub const SITE: &str = "pnnl.campus.bldg";

pub fn ahu(id: &str) -> TagRow {
    TagRow::new()
        .with(tag::ID, id)
        .with(tag::AHU, "m:")
        .with(tag::SITE_REF, SITE)
}

pub fn vav(id: &str, ahu_ref: Option<&str>) -> TagRow {
    let row = TagRow::new()
        .with(tag::ID, id)
        .with(tag::VAV, "m:")
        .with(tag::SITE_REF, SITE);
    match ahu_ref {
        Some(ahu) => row.with(tag::AHU_REF, ahu),
        None => row,
    }
}

pub fn meter(id: &str) -> TagRow {
    TagRow::new()
        .with(tag::ID, id)
        .with(tag::SITE_METER, "m:")
        .with(tag::SITE_REF, SITE)
}

/// Point row classified through the default `miniDis` field
pub fn point(equip_id: &str, meta: &str, topic: &str) -> TagRow {
    TagRow::new()
        .with(tag::ID, format!("{equip_id}.{meta}"))
        .with(tag::EQUIP_REF, equip_id)
        .with("miniDis", meta)
        .with(tag::TOPIC_NAME, topic)
}

pub fn source(equipment: Vec<TagRow>, points: Vec<TagRow>) -> JsonTagSource {
    JsonTagSource::from_rows(equipment, points, None)
}

pub fn points_source(points: Vec<TagRow>) -> JsonTagSource {
    source(Vec::new(), points)
}

/// Minimal configuration tree with JSON metadata and the given extras merged in
pub fn config(extra: Value) -> Value {
    let mut base = json!({
        "site_id": SITE,
        "metadata": {"equip_json": "equip.json", "points_json": "points.json"}
    });
    if let (Some(base), Value::Object(extra)) = (base.as_object_mut(), extra) {
        base.extend(extra);
    }
    base
}

/// Settings writing into `output_dir`
pub fn settings(output_dir: &Path, extra: Value) -> Settings {
    ConfigLoader::from_value(config(extra))
        .set("output_dir", output_dir)
        .load()
        .unwrap()
}

pub fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}
