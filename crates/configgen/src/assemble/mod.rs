//! Config Assembly
//!
//! The [`ConfigAssembler`] owns everything a run produces: the output
//! layout, the diagnostics collector and the deployment manifest. Families
//! hand it finished configs one entity at a time; [`ConfigAssembler::finish`]
//! persists the manifest and diagnostics and decides the run outcome.

mod output;
mod template;

pub use output::{
    CONFIGS_DIR, DIAGNOSTICS_FILE, ERRORS_DIR, MANIFEST_FILE, Manifest, ManifestEntry,
    OutputLayout, write_json,
};
pub use template::{Substitution, instantiate, overlay, take_object};

use std::path::{Path, PathBuf};

use haystack_types::Diagnostics;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{ConfigGenError, Result};

/// What a completed run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub output_dir: PathBuf,
    /// Config files written under `configs/`, in write order
    pub configs: Vec<PathBuf>,
    pub unmapped: usize,
    pub diagnostics_file: Option<PathBuf>,
}

/// Outcome of a run that did not abort
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every entity resolved
    Success(RunReport),
    /// Some entities were recorded as unmapped; everything else was written
    PartialFailure(RunReport),
}

impl RunOutcome {
    pub fn report(&self) -> &RunReport {
        match self {
            RunOutcome::Success(report) | RunOutcome::PartialFailure(report) => report,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success(_))
    }
}

pub struct ConfigAssembler {
    layout: OutputLayout,
    diagnostics: Diagnostics,
    manifest: Manifest,
    configs: Vec<PathBuf>,
}

impl ConfigAssembler {
    pub fn new(output_dir: &Path) -> Result<Self> {
        Ok(Self {
            layout: OutputLayout::prepare(output_dir)?,
            diagnostics: Diagnostics::new(),
            manifest: Manifest::new(),
            configs: Vec::new(),
        })
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Write `configs/<file_name>` and return its absolute path
    pub fn write_config(&mut self, file_name: &str, config: &impl Serialize) -> Result<PathBuf> {
        let path = self.layout.config_path(file_name);
        write_json(&path, config)?;
        info!("Generated {}", file_name);
        self.configs.push(path.clone());
        Ok(path)
    }

    /// Copy an existing file to `configs/<file_name>` unchanged
    pub fn copy_config(&mut self, from: &Path, file_name: &str) -> Result<PathBuf> {
        let path = self.layout.config_path(file_name);
        std::fs::copy(from, &path).map_err(|source| ConfigGenError::Write {
            path: path.clone(),
            source,
        })?;
        info!("Copied {} to {}", from.display(), file_name);
        self.configs.push(path.clone());
        Ok(path)
    }

    /// Write `errors/<file_name>`
    pub fn write_error_file(&mut self, file_name: &str, content: &impl Serialize) -> Result<PathBuf> {
        let path = self.layout.error_path(file_name);
        write_json(&path, content)?;
        Ok(path)
    }

    pub fn register(&mut self, key: impl Into<String>, entry: ManifestEntry) {
        self.manifest.entry(key.into()).or_default().push(entry);
    }

    /// Persist manifest and diagnostics and classify the run
    pub fn finish(self) -> Result<RunOutcome> {
        if !self.manifest.is_empty() {
            write_json(&self.layout.root().join(MANIFEST_FILE), &self.manifest)?;
        }

        let mut report = RunReport {
            output_dir: self.layout.root().to_path_buf(),
            configs: self.configs,
            unmapped: self.diagnostics.len(),
            diagnostics_file: None,
        };

        if self.diagnostics.is_empty() {
            info!("Generated {} config files", report.configs.len());
            return Ok(RunOutcome::Success(report));
        }

        let path = self.layout.error_path(DIAGNOSTICS_FILE);
        write_json(&path, self.diagnostics.unmapped())?;
        warn!(
            "Unable to generate configurations for all devices ({} unmapped). Please see {} for details",
            report.unmapped,
            path.display()
        );
        report.diagnostics_file = Some(path);
        Ok(RunOutcome::PartialFailure(report))
    }
}
