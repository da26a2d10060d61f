//! Run configuration for wavepipe-rs
//!
//! A run is described by one file, TOML or JSON depending on its extension:
//!
//! ```toml
//! input_folder = "frames"
//! output_folder = "out"
//! color_mode = "rgb"
//! max_waves = 100
//!
//! [frame]
//! width = 640
//! height = 480
//! custom_levels = [{ width = 320, height = 180 }]
//!
//! [save]
//! enabled = true
//! ports = "ALL"
//! job_name_in_port = false
//! ```

use crate::error::{Result, ResultExt, WavepipeError};
use crate::persist::{PortPersistence, SaveSettings};
use crate::pipeline::level::FrameGeometry;
use crate::pipeline::port::MAX_WAVE_OFFSET;
use crate::source::ColorMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// KPI log file name inside the output folder
pub const DEFAULT_KPI_LOG: &str = "kpi.csv";

/// Manifest file name inside the output folder
pub const MANIFEST_FILE: &str = "manifest.json";

/// Folder under the output folder receiving saved ports
pub const SAVED_PORTS_DIR: &str = "ports";

/// Default delay of the demo pipeline's copy job, in waves
pub const DEFAULT_DELAY_WAVES: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Folder of input frames
    pub input_folder: PathBuf,
    /// Folder receiving the KPI log, manifest and saved ports
    pub output_folder: PathBuf,
    /// KPI CSV path; `<output_folder>/kpi.csv` when unset
    pub kpi_log: Option<PathBuf>,
    pub color_mode: ColorMode,
    /// Stop after this many waves even if frames remain
    pub max_waves: Option<u64>,
    /// Offset of the demo delay line
    pub delay_waves: u32,
    pub write_manifest: bool,
    /// Input frame geometry and custom level table
    pub frame: FrameGeometry,
    pub save: SaveSettings,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            input_folder: PathBuf::from("frames"),
            output_folder: PathBuf::from("out"),
            kpi_log: None,
            color_mode: ColorMode::default(),
            max_waves: None,
            delay_waves: DEFAULT_DELAY_WAVES,
            write_manifest: true,
            frame: FrameGeometry::default(),
            save: SaveSettings::default(),
        }
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false)
}

impl RunConfig {
    /// Load from `.toml`, or JSON for any other extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read run config {}", path.display()))?;

        let config: Self = if is_toml(path) {
            toml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load a run config, returning defaults if any error occurs
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load run config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save as TOML or JSON, following the extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = if is_toml(path) {
            toml::to_string_pretty(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write run config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame.width == 0 || self.frame.height == 0 {
            return Err(WavepipeError::Config(format!(
                "frame size {}x{} is empty",
                self.frame.width, self.frame.height
            )));
        }
        if let Some(level) = self
            .frame
            .custom_levels
            .iter()
            .position(|size| size.width == 0 || size.height == 0)
        {
            return Err(WavepipeError::Config(format!("custom level LC{} is empty", level)));
        }
        if self.delay_waves > MAX_WAVE_OFFSET {
            return Err(WavepipeError::Config(format!(
                "delay_waves {} exceeds {}",
                self.delay_waves, MAX_WAVE_OFFSET
            )));
        }
        Ok(())
    }

    pub fn kpi_log_path(&self) -> PathBuf {
        self.kpi_log
            .clone()
            .unwrap_or_else(|| self.output_folder.join(DEFAULT_KPI_LOG))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.output_folder.join(MANIFEST_FILE)
    }

    /// Port persistence under `<output_folder>/ports`, if saving is enabled
    pub fn persistence(&self) -> Option<PortPersistence> {
        self.save.enabled.then(|| {
            PortPersistence::new(self.output_folder.join(SAVED_PORTS_DIR), self.save.clone())
        })
    }
}
