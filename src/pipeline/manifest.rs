//! JSON description of a built pipeline: resolved order, wiring and buffers.

use crate::error::{Result, ResultExt};
use crate::pipeline::level::{FrameGeometry, PyramidLevel};
use crate::pipeline::port::{DType, PortKey, PortRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobManifest {
    pub generated_at: DateTime<Utc>,
    pub geometry: FrameGeometry,
    /// Jobs in execution order.
    pub jobs: Vec<ManifestJob>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestJob {
    /// Position in the execution order.
    pub order: usize,
    /// Position in the registry.
    pub registered: usize,
    pub name: String,
    pub action: String,
    pub level: PyramidLevel,
    pub inputs: Vec<PortRef>,
    pub outputs: Vec<ManifestPort>,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestPort {
    pub key: PortKey,
    pub shape: Vec<usize>,
    pub dtype: DType,
    pub color: bool,
    pub history_depth: usize,
}

impl JobManifest {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write manifest {}", path.display()))?;
        Ok(())
    }

    pub fn job(&self, name: &str) -> Option<&ManifestJob> {
        self.jobs.iter().find(|job| job.name == name)
    }
}
