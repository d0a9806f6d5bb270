//! Unmapped device diagnostics
//!
//! Every entity that cannot be fully resolved during a run ends up as an
//! [`UnmappedDevice`] keyed by its id. Records are created once and then only
//! enriched: a repeated record for the same key appends a new error message
//! and merges topic details, it never replaces what was there. Only
//! [`Diagnostics::supersede`] hands an existing record a new kind and topic.
//!
//! The collector also keeps the topic names observed per equipment and point
//! type, so that a later failure can report what *was* found.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::DeviceKind;

/// Topic names attached to a diagnostic record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TopicDetail {
    Single(String),
    List(Vec<String>),
    /// Keyed by point type, or by child equipment id
    Map(BTreeMap<String, TopicDetail>),
}

impl TopicDetail {
    /// Additive merge; only maps can absorb new information
    fn merge(&mut self, other: TopicDetail) {
        if let (TopicDetail::Map(mine), TopicDetail::Map(theirs)) = (&mut *self, other) {
            for (key, value) in theirs {
                match mine.get_mut(&key) {
                    Some(existing) => existing.merge(value),
                    None => {
                        mine.insert(key, value);
                    }
                }
            }
        }
    }
}

/// Why one entity could not be mapped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmappedDevice {
    #[serde(rename = "type")]
    pub kind: DeviceKind,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_name: Option<TopicDetail>,
}

impl UnmappedDevice {
    pub fn new(kind: DeviceKind, error: impl Into<String>) -> Self {
        Self {
            kind,
            error: error.into(),
            topic_name: None,
        }
    }

    pub fn with_topic(mut self, topic: Option<TopicDetail>) -> Self {
        self.topic_name = topic;
        self
    }

    fn absorb(&mut self, other: UnmappedDevice) {
        if !self.error.split("; ").any(|e| e == other.error) {
            self.error.push_str("; ");
            self.error.push_str(&other.error);
        }
        if let Some(topic) = other.topic_name {
            self.enrich(topic);
        }
    }

    fn supersede(&mut self, other: UnmappedDevice) {
        self.kind = other.kind;
        self.topic_name = other.topic_name;
        if !self.error.split("; ").any(|e| e == other.error) {
            self.error.push_str("; ");
            self.error.push_str(&other.error);
        }
    }

    fn enrich(&mut self, topic: TopicDetail) {
        match &mut self.topic_name {
            Some(existing) => existing.merge(topic),
            None => self.topic_name = Some(topic),
        }
    }
}

/// Run-wide diagnostics collector
#[derive(Debug, Default)]
pub struct Diagnostics {
    unmapped: BTreeMap<String, UnmappedDevice>,
    observed: BTreeMap<String, BTreeMap<String, TopicDetail>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or enrich) the unmapped entry for `entity`
    pub fn record(&mut self, entity: impl Into<String>, detail: UnmappedDevice) {
        let entity = entity.into();
        match self.unmapped.get_mut(&entity) {
            Some(existing) => existing.absorb(detail),
            None => {
                self.unmapped.insert(entity, detail);
            }
        }
    }

    /// Record `detail` for `entity`, taking over the kind and topic details
    /// of any existing record. Earlier error messages are kept.
    pub fn supersede(&mut self, entity: impl Into<String>, detail: UnmappedDevice) {
        let entity = entity.into();
        match self.unmapped.get_mut(&entity) {
            Some(existing) => existing.supersede(detail),
            None => {
                self.unmapped.insert(entity, detail);
            }
        }
    }

    /// Attach topic details to an existing record. Returns false when there
    /// is no record for `entity`.
    pub fn enrich(&mut self, entity: &str, topic: TopicDetail) -> bool {
        match self.unmapped.get_mut(entity) {
            Some(existing) => {
                existing.enrich(topic);
                true
            }
            None => false,
        }
    }

    /// Remember the topic(s) seen for a point type on an equipment
    pub fn observe(&mut self, equip_id: &str, point_type: &str, topic: TopicDetail) {
        self.observed
            .entry(equip_id.to_string())
            .or_default()
            .insert(point_type.to_string(), topic);
    }

    /// All topics observed for an equipment, keyed by point type
    pub fn observed(&self, equip_id: &str) -> Option<TopicDetail> {
        self.observed
            .get(equip_id)
            .map(|topics| TopicDetail::Map(topics.clone()))
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.unmapped.contains_key(entity)
    }

    pub fn get(&self, entity: &str) -> Option<&UnmappedDevice> {
        self.unmapped.get(entity)
    }

    pub fn len(&self) -> usize {
        self.unmapped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unmapped.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &UnmappedDevice)> {
        self.unmapped.iter()
    }

    /// The unmapped records, ordered by entity id
    pub fn unmapped(&self) -> &BTreeMap<String, UnmappedDevice> {
        &self.unmapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn single(topic: &str) -> TopicDetail {
        TopicDetail::Single(topic.to_string())
    }

    #[test]
    fn test_record_creates_entry() {
        let mut diag = Diagnostics::new();
        diag.record("vav1", UnmappedDevice::new(DeviceKind::Vav, "Unable to find ahuRef"));

        assert_eq!(diag.len(), 1);
        let entry = diag.get("vav1").unwrap();
        assert_eq!(entry.kind, DeviceKind::Vav);
        assert!(entry.topic_name.is_none());
    }

    #[test]
    fn test_repeat_record_is_idempotent() {
        let mut diag = Diagnostics::new();
        for _ in 0..3 {
            diag.record("ahu1", UnmappedDevice::new(DeviceKind::Ahu, "missing fan_status"));
        }
        assert_eq!(diag.get("ahu1").unwrap().error, "missing fan_status");
    }

    #[test]
    fn test_repeat_record_appends_new_error_and_keeps_kind() {
        let mut diag = Diagnostics::new();
        diag.record("ahu1", UnmappedDevice::new(DeviceKind::Ahu, "first"));
        diag.record("ahu1", UnmappedDevice::new(DeviceKind::Vav, "second"));

        let entry = diag.get("ahu1").unwrap();
        assert_eq!(entry.kind, DeviceKind::Ahu);
        assert_eq!(entry.error, "first; second");
    }

    #[test]
    fn test_enrich_merges_topic_maps() {
        let mut diag = Diagnostics::new();
        diag.observe("vav1", "DmpCmd", single("devices/b/vav1/DmpCmd"));
        diag.record(
            "vav1",
            UnmappedDevice::new(DeviceKind::Vav, "missing").with_topic(diag.observed("vav1")),
        );
        diag.observe("vav1", "RhtVlvPos", single("devices/b/vav1/RhtVlvPos"));
        assert!(diag.enrich("vav1", diag.observed("vav1").unwrap()));
        assert!(!diag.enrich("vav2", single("x")));

        let value = serde_json::to_value(diag.unmapped()).unwrap();
        assert_eq!(
            value,
            json!({
                "vav1": {
                    "type": "vav",
                    "error": "missing",
                    "topic_name": {
                        "DmpCmd": "devices/b/vav1/DmpCmd",
                        "RhtVlvPos": "devices/b/vav1/RhtVlvPos"
                    }
                }
            })
        );
    }

    #[test]
    fn test_supersede_takes_kind_and_topics() {
        let mut diag = Diagnostics::new();
        let mut ahu_topics = BTreeMap::new();
        ahu_topics.insert("SaFanCmd".to_string(), single("devices/b/ahu1/SaFanCmd"));
        diag.record(
            "ahu1",
            UnmappedDevice::new(DeviceKind::Ahu, "no duct pressure")
                .with_topic(Some(TopicDetail::Map(ahu_topics))),
        );

        let mut vav_topics = BTreeMap::new();
        vav_topics.insert("vav1".to_string(), single("devices/b/vav1/RhtVlv"));
        diag.supersede(
            "ahu1",
            UnmappedDevice::new(DeviceKind::Vav, "no zone damper")
                .with_topic(Some(TopicDetail::Map(vav_topics))),
        );
        diag.supersede("vav9", UnmappedDevice::new(DeviceKind::Vav, "fresh"));

        let value = serde_json::to_value(diag.unmapped()).unwrap();
        assert_eq!(
            value["ahu1"],
            json!({
                "type": "vav",
                "error": "no duct pressure; no zone damper",
                "topic_name": {"vav1": "devices/b/vav1/RhtVlv"}
            })
        );
        assert_eq!(value["vav9"], json!({"type": "vav", "error": "fresh"}));
    }

    #[test]
    fn test_enrich_does_not_overwrite_scalar_topic() {
        let mut diag = Diagnostics::new();
        diag.record(
            "pm",
            UnmappedDevice::new(DeviceKind::PowerMeter, "ambiguous").with_topic(Some(single("a"))),
        );
        diag.enrich("pm", single("b"));
        assert_eq!(diag.get("pm").unwrap().topic_name, Some(single("a")));
    }
}
