//! Point roles and multi-valued point collapsing

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Candidate tag values for one point role, tried in declared order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Candidates {
    One(String),
    Many(Vec<String>),
}

impl Candidates {
    pub fn values(&self) -> &[String] {
        match self {
            Candidates::One(v) => std::slice::from_ref(v),
            Candidates::Many(vs) => vs,
        }
    }
}

impl std::fmt::Display for Candidates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Candidates::One(v) => f.write_str(v),
            Candidates::Many(vs) => write!(f, "[{}]", vs.join(", ")),
        }
    }
}

impl From<&str> for Candidates {
    fn from(value: &str) -> Self {
        Candidates::One(value.to_string())
    }
}

impl From<Vec<&str>> for Candidates {
    fn from(values: Vec<&str>) -> Self {
        Candidates::Many(values.into_iter().map(String::from).collect())
    }
}

/// Point role → candidate tag values
pub type PointMetaMap = BTreeMap<String, Candidates>;

/// Distinct point names gathered for one role across several child devices
///
/// Backed by an ordered set so that collapsing is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointSet(BTreeSet<String>);

impl PointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>) {
        self.0.insert(name.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Collapse to the value written into a config: `""` when empty, the
    /// single name when there is one, a sorted list otherwise.
    pub fn collapse(self) -> Value {
        let mut names: Vec<String> = self.0.into_iter().collect();
        match names.len() {
            0 => Value::String(String::new()),
            1 => Value::String(names.remove(0)),
            _ => Value::Array(names.into_iter().map(Value::String).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collapse_empty() {
        assert_eq!(PointSet::new().collapse(), json!(""));
    }

    #[test]
    fn test_collapse_single_after_duplicates() {
        let mut set = PointSet::new();
        set.insert("DmpCmd");
        set.insert("DmpCmd");
        assert_eq!(set.len(), 1);
        assert_eq!(set.collapse(), json!("DmpCmd"));
    }

    #[test]
    fn test_collapse_many_is_sorted_and_distinct() {
        let mut set = PointSet::new();
        for name in ["vavDmpPos", "DmpCmd", "vavDmpPos", "Damper"] {
            set.insert(name);
        }
        assert_eq!(set.collapse(), json!(["Damper", "DmpCmd", "vavDmpPos"]));
    }

    #[test]
    fn test_candidates_deserialize() {
        let map: PointMetaMap = serde_json::from_value(json!({
            "sa_temp": "SaTemp",
            "cool_call": ["ChwVlvPos", "ChwVlvCmd"]
        }))
        .unwrap();
        assert_eq!(map["sa_temp"].values(), ["SaTemp".to_string()]);
        assert_eq!(map["cool_call"].values().len(), 2);
        assert_eq!(map["cool_call"].to_string(), "[ChwVlvPos, ChwVlvCmd]");
    }
}
