//! JSON Tag Source
//!
//! Two documents of the form `{"rows": [{tag: value, ...}, ...]}`, one for
//! equipment and one for points, read once at construction. Point rows are
//! indexed by `equipRef` so per-equipment lookups stay cheap on large sites.

use std::collections::HashMap;
use std::path::Path;

use haystack_types::{TagFilter, TagRow, tag};
use serde::Deserialize;
use tracing::info;

use super::{SourceError, TagSource, scoped};

#[derive(Deserialize)]
struct Document {
    rows: Vec<TagRow>,
}

/// In-memory tag source over two JSON documents
#[derive(Debug)]
pub struct JsonTagSource {
    equipment: Vec<TagRow>,
    points: Vec<TagRow>,
    points_by_equip: HashMap<String, Vec<usize>>,
    site_id: Option<String>,
}

impl JsonTagSource {
    /// Load both documents. Any read or parse failure is fatal.
    pub fn open(
        equip_path: &Path,
        points_path: &Path,
        site_id: Option<String>,
    ) -> Result<Self, SourceError> {
        let equipment = read_rows(equip_path)?;
        let points = read_rows(points_path)?;
        info!(
            "Loaded {} equipment rows and {} point rows",
            equipment.len(),
            points.len()
        );
        Ok(Self::from_rows(equipment, points, site_id))
    }

    pub fn from_rows(equipment: Vec<TagRow>, points: Vec<TagRow>, site_id: Option<String>) -> Self {
        let mut points_by_equip: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, row) in points.iter().enumerate() {
            if let Some(equip) = row.non_empty(tag::EQUIP_REF) {
                points_by_equip.entry(equip.to_string()).or_default().push(idx);
            }
        }
        Self {
            equipment,
            points,
            points_by_equip,
            site_id,
        }
    }
}

impl TagSource for JsonTagSource {
    fn list_equipment(&self, filter: &TagFilter) -> Result<Vec<TagRow>, SourceError> {
        let filter = scoped(filter, self.site_id.as_deref());
        Ok(self
            .equipment
            .iter()
            .filter(|row| row.matches(&filter))
            .cloned()
            .collect())
    }

    fn list_points(&self, filter: &TagFilter) -> Result<Vec<TagRow>, SourceError> {
        let rows: Vec<&TagRow> = match filter.pinned(tag::EQUIP_REF) {
            Some(equip) => self
                .points_by_equip
                .get(equip)
                .map(|idxs| idxs.iter().map(|&i| &self.points[i]).collect())
                .unwrap_or_default(),
            None => self.points.iter().collect(),
        };
        Ok(rows
            .into_iter()
            .filter(|row| row.matches(filter))
            .cloned()
            .collect())
    }
}

fn read_rows(path: &Path) -> Result<Vec<TagRow>, SourceError> {
    let content = std::fs::read_to_string(path).map_err(|source| SourceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let doc: Document = serde_json::from_str(&content).map_err(|source| SourceError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(doc.rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source(site: Option<&str>) -> JsonTagSource {
        let equipment = vec![
            TagRow::new()
                .with(tag::ID, "s1.b.ahu1")
                .with(tag::AHU, "m:")
                .with(tag::SITE_REF, "s1.b"),
            TagRow::new()
                .with(tag::ID, "s2.b.ahu9")
                .with(tag::AHU, "m:")
                .with(tag::SITE_REF, "s2.b"),
        ];
        let points = vec![
            TagRow::new()
                .with(tag::EQUIP_REF, "s1.b.ahu1")
                .with("miniDis", "SaTemp")
                .with(tag::TOPIC_NAME, "devices/b/ahu1/SaTemp"),
            TagRow::new()
                .with(tag::EQUIP_REF, "s1.b.ahu1")
                .with("miniDis", "SaFanCmd")
                .with(tag::TOPIC_NAME, "devices/b/ahu1/SaFanCmd"),
            TagRow::new().with("miniDis", "Orphan"),
        ];
        JsonTagSource::from_rows(equipment, points, site.map(String::from))
    }

    #[test]
    fn test_site_scope_applies_to_equipment() {
        let filter = TagFilter::new().has(tag::AHU);
        assert_eq!(source(None).list_equipment(&filter).unwrap().len(), 2);

        let scoped = source(Some("s1.b")).list_equipment(&filter).unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].id(), Some("s1.b.ahu1"));
    }

    #[test]
    fn test_points_by_equipment_index() {
        let src = source(None);
        let filter = TagFilter::new()
            .equals(tag::EQUIP_REF, "s1.b.ahu1")
            .equals("miniDis", "SaFanCmd");
        let rows = src.list_points(&filter).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].str(tag::TOPIC_NAME), Some("devices/b/ahu1/SaFanCmd"));

        let unknown = TagFilter::new().equals(tag::EQUIP_REF, "nope");
        assert!(src.list_points(&unknown).unwrap().is_empty());
    }

    #[test]
    fn test_points_without_equip_filter_scan_everything() {
        let rows = source(None)
            .list_points(&TagFilter::new().has("miniDis"))
            .unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_open_documents() {
        let dir = TempDir::new().unwrap();
        let equip = dir.path().join("equip.json");
        let points = dir.path().join("points.json");
        std::fs::write(&equip, r#"{"rows": [{"id": "a.b.vav1", "vav": "m:"}]}"#).unwrap();
        std::fs::write(&points, r#"{"rows": []}"#).unwrap();

        let src = JsonTagSource::open(&equip, &points, None).unwrap();
        let vavs = src.list_equipment(&TagFilter::new().has(tag::VAV)).unwrap();
        assert_eq!(vavs.len(), 1);
    }

    #[test]
    fn test_open_rejects_bad_documents() {
        let dir = TempDir::new().unwrap();
        let equip = dir.path().join("equip.json");
        std::fs::write(&equip, r#"{"items": []}"#).unwrap();

        let err = JsonTagSource::open(&equip, &dir.path().join("missing.json"), None).unwrap_err();
        assert!(matches!(err, SourceError::Parse { .. }));

        std::fs::write(&equip, r#"{"rows": []}"#).unwrap();
        let err = JsonTagSource::open(&equip, &dir.path().join("missing.json"), None).unwrap_err();
        assert!(matches!(err, SourceError::Read { .. }));
    }
}
