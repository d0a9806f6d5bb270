//! Equipment identifiers and kinds

use serde::{Deserialize, Serialize};

/// Kind of entity an unmapped record refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Ahu,
    Vav,
    PowerMeter,
    PairwiseCriteria,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Ahu => "ahu",
            DeviceKind::Vav => "vav",
            DeviceKind::PowerMeter => "power_meter",
            DeviceKind::PairwiseCriteria => "pairwise_criteria",
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical short name of a dotted equipment id (`site.bldg.ahu1` → `ahu1`)
pub fn short_name(id: &str) -> &str {
    id.rsplit('.').next().unwrap_or(id)
}

/// Second to last segment of a dotted id (`campus.bldg` → `campus`)
pub fn parent_name(id: &str) -> Option<&str> {
    let mut segments = id.rsplit('.');
    segments.next();
    segments.next()
}
