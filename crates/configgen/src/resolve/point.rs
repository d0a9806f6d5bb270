//! Point Resolution
//!
//! Maps an abstract point role to the concrete point name of one equipment.
//! Candidates are tried in declared order and the first unambiguous match
//! wins. Two rows carrying the same candidate value on one equipment is an
//! ambiguity: it is recorded and the role resolves to nothing, even when a
//! later candidate would have matched.

use std::collections::BTreeMap;

use haystack_types::{
    Candidates, DeviceKind, Diagnostics, PointMetaMap, TagFilter, TopicDetail, UnmappedDevice, tag,
};
use tracing::debug;

use crate::config::PointNameStrategy;
use crate::source::{SourceError, TagSource};

// ─────────────────────────────────────────────────────────────────────────────
// Point naming
// ─────────────────────────────────────────────────────────────────────────────

/// Derives a point name from a topic string
///
/// Deployments with their own topic conventions plug in a different
/// implementation. An empty result means no name could be derived.
pub trait PointNaming {
    fn point_name(&self, topic: &str, equip_id: &str, kind: DeviceKind) -> String;
}

/// Text after the last `/`, then after the last `.` or `:`
#[derive(Debug, Clone, Copy, Default)]
pub struct SuffixPointNaming;

impl PointNaming for SuffixPointNaming {
    fn point_name(&self, topic: &str, _equip_id: &str, _kind: DeviceKind) -> String {
        let leaf = topic.rsplit('/').next().unwrap_or_default();
        leaf.rsplit(['.', ':']).next().unwrap_or_default().to_string()
    }
}

/// Text after the last `/`
#[derive(Debug, Clone, Copy, Default)]
pub struct TopicLeafNaming;

impl PointNaming for TopicLeafNaming {
    fn point_name(&self, topic: &str, _equip_id: &str, _kind: DeviceKind) -> String {
        topic.rsplit('/').next().unwrap_or_default().to_string()
    }
}

pub fn naming_for(strategy: PointNameStrategy) -> Box<dyn PointNaming> {
    match strategy {
        PointNameStrategy::Suffix => Box::new(SuffixPointNaming),
        PointNameStrategy::TopicLeaf => Box::new(TopicLeafNaming),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolver
// ─────────────────────────────────────────────────────────────────────────────

/// Resolved and unresolved roles of one equipment
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RoleResolution {
    pub found: BTreeMap<String, String>,
    /// Roles that did not resolve, in the order they were asked for
    pub missing: Vec<String>,
}

impl RoleResolution {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

pub struct PointResolver<'a> {
    source: &'a dyn TagSource,
    naming: &'a dyn PointNaming,
    meta_field: &'a str,
    roles: &'a PointMetaMap,
}

impl<'a> PointResolver<'a> {
    pub fn new(
        source: &'a dyn TagSource,
        naming: &'a dyn PointNaming,
        meta_field: &'a str,
        roles: &'a PointMetaMap,
    ) -> Self {
        Self {
            source,
            naming,
            meta_field,
            roles,
        }
    }

    pub fn meta_field(&self) -> &str {
        self.meta_field
    }

    /// Configured candidates for a role
    pub fn candidates(&self, role: &str) -> Option<&Candidates> {
        self.roles.get(role)
    }

    /// Point name for `role` on `equip_id`, or `None`
    ///
    /// Every topic seen along the way is observed into `diagnostics` so that
    /// a later failure for this equipment can report it.
    pub fn resolve(
        &self,
        equip_id: &str,
        kind: DeviceKind,
        role: &str,
        diagnostics: &mut Diagnostics,
    ) -> Result<Option<String>, SourceError> {
        let Some(candidates) = self.roles.get(role) else {
            debug!("No metadata configured for point role '{}'", role);
            return Ok(None);
        };

        for candidate in candidates.values() {
            let filter = TagFilter::new()
                .equals(tag::EQUIP_REF, equip_id)
                .equals(self.meta_field, candidate.as_str());
            let rows = self.source.list_points(&filter)?;

            match rows.as_slice() {
                [] => continue,
                [row] => {
                    let topic = row.str(tag::TOPIC_NAME).unwrap_or_default();
                    diagnostics.observe(equip_id, candidate, TopicDetail::Single(topic.to_string()));

                    let name = self.naming.point_name(topic, equip_id, kind);
                    if name.is_empty() {
                        diagnostics.record(
                            equip_id,
                            UnmappedDevice::new(kind, "Unable to get point name from topic")
                                .with_topic(Some(TopicDetail::Single(topic.to_string()))),
                        );
                        return Ok(None);
                    }
                    debug!("{} {} -> {}", equip_id, role, name);
                    return Ok(Some(name));
                }
                _ => {
                    let topics: Vec<String> = rows
                        .iter()
                        .map(|row| row.str(tag::TOPIC_NAME).unwrap_or_default().to_string())
                        .collect();
                    diagnostics.observe(equip_id, candidate, TopicDetail::List(topics.clone()));
                    diagnostics.record(
                        equip_id,
                        UnmappedDevice::new(
                            kind,
                            format!(
                                "More than one point have the same configured metadata: \
                                 {candidate} in the metadata field {}",
                                self.meta_field
                            ),
                        )
                        .with_topic(Some(TopicDetail::List(topics))),
                    );
                    return Ok(None);
                }
            }
        }
        Ok(None)
    }

    /// Resolve several roles for one equipment
    pub fn resolve_all<'r>(
        &self,
        equip_id: &str,
        kind: DeviceKind,
        roles: impl IntoIterator<Item = &'r str>,
        diagnostics: &mut Diagnostics,
    ) -> Result<RoleResolution, SourceError> {
        let mut resolution = RoleResolution::default();
        for role in roles {
            match self.resolve(equip_id, kind, role, diagnostics)? {
                Some(name) => {
                    resolution.found.insert(role.to_string(), name);
                }
                None => resolution.missing.push(role.to_string()),
            }
        }
        Ok(resolution)
    }
}
