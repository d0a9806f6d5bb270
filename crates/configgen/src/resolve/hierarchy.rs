//! Equipment Hierarchy
//!
//! Discovers AHU → VAV topology (and the reverse orientation) plus the
//! building power meter. All results are sorted by equipment id so that a
//! fixed metadata snapshot always produces the same iteration order.

use std::collections::BTreeMap;

use haystack_types::{DeviceKind, Diagnostics, TagFilter, TagRow, UnmappedDevice, tag};
use tracing::{debug, info};

use crate::error::{ConfigGenError, Result};
use crate::source::TagSource;

/// AHUs with their VAVs, and the VAVs that reference no AHU
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Topology {
    pub ahus: BTreeMap<String, Vec<String>>,
    pub unmapped_vavs: Vec<String>,
}

pub struct HierarchyResolver<'a> {
    source: &'a dyn TagSource,
}

impl<'a> HierarchyResolver<'a> {
    pub fn new(source: &'a dyn TagSource) -> Self {
        Self { source }
    }

    /// Ids of every equipment tagged `ahu`
    pub fn ahus(&self) -> Result<Vec<String>> {
        let rows = self.source.list_equipment(&TagFilter::new().has(tag::AHU))?;
        Ok(sorted_ids(&rows))
    }

    /// AHU → VAVs
    ///
    /// Includes AHUs without VAVs and AHUs only known through a VAV's
    /// `ahuRef`. VAVs without `ahuRef` are recorded as unmapped right away.
    pub fn ahus_with_vavs(&self, diagnostics: &mut Diagnostics) -> Result<Topology> {
        let mut topology = Topology::default();

        let mapped = self
            .source
            .list_equipment(&TagFilter::new().has(tag::VAV).non_empty(tag::AHU_REF))?;
        for row in &mapped {
            if let (Some(vav), Some(ahu)) = (row.id(), row.non_empty(tag::AHU_REF)) {
                topology
                    .ahus
                    .entry(ahu.to_string())
                    .or_default()
                    .push(vav.to_string());
            }
        }
        for vavs in topology.ahus.values_mut() {
            vavs.sort();
        }

        for ahu in self.ahus()? {
            topology.ahus.entry(ahu).or_default();
        }

        let unmapped = self
            .source
            .list_equipment(&TagFilter::new().has(tag::VAV).missing(tag::AHU_REF))?;
        topology.unmapped_vavs = sorted_ids(&unmapped);
        for vav in &topology.unmapped_vavs {
            diagnostics.record(
                vav.as_str(),
                UnmappedDevice::new(DeviceKind::Vav, "Unable to find ahuRef"),
            );
        }

        info!(
            "Found {} AHUs, {} mapped VAVs, {} VAVs without ahuRef",
            topology.ahus.len(),
            mapped.len(),
            topology.unmapped_vavs.len()
        );
        Ok(topology)
    }

    /// VAV → AHU, `None` when the VAV references no AHU
    pub fn vavs_with_ahu(&self) -> Result<Vec<(String, Option<String>)>> {
        let rows = self.source.list_equipment(&TagFilter::new().has(tag::VAV))?;
        let mut vavs: Vec<(String, Option<String>)> = rows
            .iter()
            .filter_map(|row| {
                let id = row.id()?;
                Some((id.to_string(), row.non_empty(tag::AHU_REF).map(str::to_string)))
            })
            .collect();
        vavs.sort();
        debug!("Found {} VAVs", vavs.len());
        Ok(vavs)
    }

    /// The single building power meter
    ///
    /// A configured id is an exact match; otherwise the unique equipment
    /// tagged `siteMeter`. More than one match is fatal.
    pub fn power_meter(&self, configured_id: Option<&str>) -> Result<Option<String>> {
        let (filter, selector) = match configured_id {
            Some(id) => (
                TagFilter::new().equals(tag::ID, id),
                format!("with the id {id}"),
            ),
            None => (
                TagFilter::new().has(tag::SITE_METER),
                format!("with the tag {}", tag::SITE_METER),
            ),
        };

        let mut candidates = sorted_ids(&self.source.list_equipment(&filter)?);
        match candidates.len() {
            0 => Ok(None),
            1 => Ok(candidates.pop()),
            _ => Err(ConfigGenError::AmbiguousPowerMeter {
                selector,
                candidates,
            }),
        }
    }
}

fn sorted_ids(rows: &[TagRow]) -> Vec<String> {
    let mut ids: Vec<String> = rows
        .iter()
        .filter_map(|row| row.id().map(str::to_string))
        .collect();
    ids.sort();
    ids
}
