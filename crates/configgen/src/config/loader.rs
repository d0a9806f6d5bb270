//! Configuration Loader
//!
//! Layers, lowest priority first: the configuration file (JSON with
//! comments, or TOML), `CONFIGGEN_*` environment variables, then explicit
//! overrides supplied by the caller.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml};
use tracing::{debug, info};

use super::{ConfigError, GeneratorConfig, Settings};

const ENV_PREFIX: &str = "CONFIGGEN_";

/// Configuration loader
pub struct ConfigLoader {
    figment: Figment,
    source_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Start from a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let figment = if path.extension().is_some_and(|ext| ext == "toml") {
            Figment::from(Toml::string(&content))
        } else {
            Figment::from(Json::string(&strip_comments(&content)))
        };
        info!("Loading configuration from {}", path.display());

        Ok(Self {
            figment: figment.merge(Env::prefixed(ENV_PREFIX).split("__")),
            source_path: Some(path.to_path_buf()),
        })
    }

    /// Start from an in-memory configuration tree
    pub fn from_value(value: serde_json::Value) -> Self {
        Self {
            figment: Figment::from(Serialized::defaults(value)),
            source_path: None,
        }
    }

    /// Override a single top-level key
    pub fn set(mut self, key: &str, value: impl serde::Serialize) -> Self {
        debug!("Configuration override for '{}'", key);
        self.figment = self.figment.merge(Serialized::default(key, value));
        self
    }

    pub fn load(self) -> Result<Settings, ConfigError> {
        let config: GeneratorConfig = self.figment.extract()?;
        Settings::from_config(config, self.source_path)
    }
}

/// Remove `//`, `#` and `/* */` comments that are outside string literals.
///
/// Line breaks inside removed comments are kept so that parser error
/// positions still point at the right line.
pub fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '#' => skip_line(&mut chars, &mut out),
            '/' if chars.peek() == Some(&'/') => skip_line(&mut chars, &mut out),
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    if n == '\n' {
                        out.push('\n');
                    }
                    prev = n;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn skip_line(chars: &mut impl Iterator<Item = char>, out: &mut String) {
    for n in chars.by_ref() {
        if n == '\n' {
            out.push('\n');
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_strip_line_and_block_comments() {
        let input = r#"{
    // site scope
    "site_id": "a.b.c", # trailing
    /* block
       comment */ "building": "b"
}"#;
        let stripped = strip_comments(input);
        let value: serde_json::Value = serde_json::from_str(&stripped).unwrap();
        assert_eq!(value, json!({"site_id": "a.b.c", "building": "b"}));
        assert_eq!(stripped.lines().count(), input.lines().count());
    }

    #[test]
    fn test_comment_markers_inside_strings_are_kept() {
        let input = r#"{"url": "http://host/#frag", "q": "a \"//\" b /* c */"}"#;
        assert_eq!(strip_comments(input), input);
    }

    #[test]
    fn test_load_json_file_with_comments() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
    // metadata from json documents
    "site_id": "pnnl.campus.bldg",
    "metadata": {"equip_json": "equip.json", "points_json": "points.json"},
    "point_meta_map": {"fan_status": "SaFanCmd"}
}"#,
        )
        .unwrap();

        let settings = ConfigLoader::from_file(&path).unwrap().load().unwrap();
        assert_eq!(settings.building, "bldg");
        assert_eq!(settings.source_path.as_deref(), Some(path.as_path()));
        assert!(settings.point_meta_map.contains_key("fan_status"));
    }

    #[test]
    fn test_load_toml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
site_id = "pnnl.campus.bldg"
point_meta_field = "dis"

[metadata]
equip_json = "equip.json"
points_json = "points.json"
"#,
        )
        .unwrap();

        let settings = ConfigLoader::from_file(&path).unwrap().load().unwrap();
        assert_eq!(settings.point_meta_field, "dis");
        assert_eq!(settings.campus, "campus");
    }

    #[test]
    fn test_overrides_win() {
        let settings = ConfigLoader::from_value(json!({
            "site_id": "pnnl.campus.bldg",
            "output_dir": "first",
            "metadata": {"equip_json": "e.json", "points_json": "p.json"}
        }))
        .set("output_dir", "second")
        .load()
        .unwrap();

        assert_eq!(settings.output_dir, Some(PathBuf::from("second")));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = ConfigLoader::from_file(dir.path().join("nope.json")).err().unwrap();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
