//! Output directory layout and JSON writing

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tracing::{debug, info};

use crate::error::{ConfigGenError, Result};

pub const CONFIGS_DIR: &str = "configs";
pub const ERRORS_DIR: &str = "errors";
pub const MANIFEST_FILE: &str = "config_metadata.json";
pub const DIAGNOSTICS_FILE: &str = "unmapped_device_details";

/// `<root>/configs` and `<root>/errors`, created on demand
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
    configs: PathBuf,
    errors: PathBuf,
}

impl OutputLayout {
    pub fn prepare(root: &Path) -> Result<Self> {
        if root.exists() && !root.is_dir() {
            return Err(ConfigGenError::OutputNotDirectory(root.to_path_buf()));
        }
        let root = absolute(root)?;
        let configs = root.join(CONFIGS_DIR);
        let errors = root.join(ERRORS_DIR);
        for dir in [&configs, &errors] {
            std::fs::create_dir_all(dir).map_err(|source| ConfigGenError::Write {
                path: dir.clone(),
                source,
            })?;
        }
        info!("Output directory {}", root.display());
        Ok(Self {
            root,
            configs,
            errors,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self, file_name: &str) -> PathBuf {
        self.configs.join(file_name)
    }

    pub fn error_path(&self, file_name: &str) -> PathBuf {
        self.errors.join(file_name)
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|source| ConfigGenError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Pretty JSON with four-space indentation. Object keys come out sorted.
pub fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    value
        .serialize(&mut ser)
        .map_err(|source| ConfigGenError::Serialize {
            what: path.display().to_string(),
            source,
        })?;
    std::fs::write(path, buf).map_err(|source| ConfigGenError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Wrote {}", path.display());
    Ok(())
}

/// One manifest entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    #[serde(rename = "config-name", skip_serializing_if = "Option::is_none")]
    pub config_name: Option<String>,
    pub config: PathBuf,
}

impl ManifestEntry {
    pub fn new(config: PathBuf) -> Self {
        Self {
            config_name: None,
            config,
        }
    }

    pub fn named(name: impl Into<String>, config: PathBuf) -> Self {
        Self {
            config_name: Some(name.into()),
            config,
        }
    }
}

/// Deployment manifest: agent key → config entries
pub type Manifest = BTreeMap<String, Vec<ManifestEntry>>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_prepare_creates_layout() {
        let dir = TempDir::new().unwrap();
        let layout = OutputLayout::prepare(&dir.path().join("out")).unwrap();
        assert!(layout.root().join(CONFIGS_DIR).is_dir());
        assert!(layout.root().join(ERRORS_DIR).is_dir());
        assert!(layout.config_path("ahu1.json").ends_with("configs/ahu1.json"));
    }

    #[test]
    fn test_prepare_rejects_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("out");
        std::fs::write(&file, "x").unwrap();
        assert!(matches!(
            OutputLayout::prepare(&file),
            Err(ConfigGenError::OutputNotDirectory(_))
        ));
    }

    #[test]
    fn test_write_json_four_space_indent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.json");
        write_json(&path, &json!({"b": 1, "a": [true]})).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "{\n    \"a\": [\n        true\n    ],\n    \"b\": 1\n}"
        );
    }

    #[test]
    fn test_manifest_entry_shape() {
        let entry = ManifestEntry::named("config", PathBuf::from("/o/configs/ilc.config"));
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({"config-name": "config", "config": "/o/configs/ilc.config"})
        );
        let bare = ManifestEntry::new(PathBuf::from("/o/configs/ahu1.json"));
        assert_eq!(
            serde_json::to_value(&bare).unwrap(),
            json!({"config": "/o/configs/ahu1.json"})
        );
    }
}
