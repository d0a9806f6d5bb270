//! Tag rows and the predicates used to select them
//!
//! A [`TagRow`] is the tag name → value mapping of one equipment or point
//! entity, as found in Haystack-style metadata. Rows are selected with a
//! conjunctive [`TagFilter`] that both metadata sources understand: the JSON
//! source evaluates it in memory, the relational source renders it to SQL.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Well-known tag names
pub mod tag {
    pub const ID: &str = "id";
    pub const AHU_REF: &str = "ahuRef";
    pub const EQUIP_REF: &str = "equipRef";
    pub const SITE_REF: &str = "siteRef";
    pub const VAV: &str = "vav";
    pub const AHU: &str = "ahu";
    pub const SITE_METER: &str = "siteMeter";
    pub const TOPIC_NAME: &str = "topic_name";
    pub const DEVICE_NAME: &str = "device_name";
}

// ─────────────────────────────────────────────────────────────────────────────
// Tag Row
// ─────────────────────────────────────────────────────────────────────────────

/// Tags of a single equipment or point entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagRow(Map<String, Value>);

impl TagRow {
    /// Create an empty row
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert
    pub fn with(mut self, tag: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(tag, value);
        self
    }

    /// Insert or replace a tag
    pub fn insert(&mut self, tag: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(tag.into(), value.into());
    }

    /// Raw tag value
    pub fn get(&self, tag: &str) -> Option<&Value> {
        self.0.get(tag)
    }

    /// Tag value if it is a string
    pub fn str(&self, tag: &str) -> Option<&str> {
        self.0.get(tag).and_then(Value::as_str)
    }

    /// Tag value if it is a non-empty string
    pub fn non_empty(&self, tag: &str) -> Option<&str> {
        self.str(tag).filter(|s| !s.is_empty())
    }

    /// Whether a presence tag is set.
    ///
    /// Markers arrive as `"m:"`, `true` or any other non-null value; `null` and
    /// `false` count as absent.
    pub fn has(&self, tag: &str) -> bool {
        !matches!(self.0.get(tag), None | Some(Value::Null) | Some(Value::Bool(false)))
    }

    /// The entity id (`id` tag)
    pub fn id(&self) -> Option<&str> {
        self.non_empty(tag::ID)
    }

    /// Number of tags on the row
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Evaluate a filter against this row
    pub fn matches(&self, filter: &TagFilter) -> bool {
        filter.predicates().iter().all(|p| p.matches(self))
    }
}

impl From<Map<String, Value>> for TagRow {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Predicates
// ─────────────────────────────────────────────────────────────────────────────

/// A single condition on one tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagPredicate {
    /// Tag is present (marker, ref or any non-null value)
    Has(String),
    /// Tag is absent, null or an empty string
    Missing(String),
    /// Tag holds a non-empty string
    NonEmpty(String),
    /// Tag holds exactly this string
    Equals(String, String),
}

impl TagPredicate {
    /// The tag this predicate inspects
    pub fn tag(&self) -> &str {
        match self {
            TagPredicate::Has(t)
            | TagPredicate::Missing(t)
            | TagPredicate::NonEmpty(t)
            | TagPredicate::Equals(t, _) => t,
        }
    }

    pub fn matches(&self, row: &TagRow) -> bool {
        match self {
            TagPredicate::Has(t) => row.has(t),
            TagPredicate::Missing(t) => match row.get(t) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.is_empty(),
                Some(_) => false,
            },
            TagPredicate::NonEmpty(t) => row.non_empty(t).is_some(),
            TagPredicate::Equals(t, expected) => row.str(t) == Some(expected.as_str()),
        }
    }
}

/// Conjunction of tag predicates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    predicates: Vec<TagPredicate>,
}

impl TagFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(mut self, tag: impl Into<String>) -> Self {
        self.predicates.push(TagPredicate::Has(tag.into()));
        self
    }

    pub fn missing(mut self, tag: impl Into<String>) -> Self {
        self.predicates.push(TagPredicate::Missing(tag.into()));
        self
    }

    pub fn non_empty(mut self, tag: impl Into<String>) -> Self {
        self.predicates.push(TagPredicate::NonEmpty(tag.into()));
        self
    }

    pub fn equals(mut self, tag: impl Into<String>, value: impl Into<String>) -> Self {
        self.predicates.push(TagPredicate::Equals(tag.into(), value.into()));
        self
    }

    pub fn predicates(&self) -> &[TagPredicate] {
        &self.predicates
    }

    /// The value an `Equals` predicate pins `tag` to, if any
    pub fn pinned(&self, tag: &str) -> Option<&str> {
        self.predicates.iter().find_map(|p| match p {
            TagPredicate::Equals(t, v) if t == tag => Some(v.as_str()),
            _ => None,
        })
    }
}
