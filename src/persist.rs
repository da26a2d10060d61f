//! Saving port buffers to disk after each wave.
//!
//! Layout: `<root>/<PORT_KEY>[_<job name>]/<frame name>.<ext>`.
//! u8 images (`[h, w]` or `[h, w, 3]`) are written as PNG, anything else as
//! the JSON serialization of the array.

use crate::error::{Result, WavepipeError};
use crate::pipeline::port::{PortBuffer, PortKey};
use crate::pipeline::store::PortStore;
use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Which ports to save. Written as `"ALL"` or a list of port keys.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "SelectionRepr", into = "SelectionRepr")]
pub enum SaveSelection {
    #[default]
    All,
    Ports(Vec<PortKey>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SelectionRepr {
    Keyword(String),
    Ports(Vec<PortKey>),
}

impl TryFrom<SelectionRepr> for SaveSelection {
    type Error = String;

    fn try_from(repr: SelectionRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            SelectionRepr::Keyword(s) if s.eq_ignore_ascii_case("all") => Ok(SaveSelection::All),
            SelectionRepr::Keyword(s) => Err(format!(
                "expected \"ALL\" or a port list, found \"{}\"",
                s
            )),
            SelectionRepr::Ports(ports) => Ok(SaveSelection::Ports(ports)),
        }
    }
}

impl From<SaveSelection> for SelectionRepr {
    fn from(selection: SaveSelection) -> Self {
        match selection {
            SaveSelection::All => SelectionRepr::Keyword("ALL".to_string()),
            SaveSelection::Ports(ports) => SelectionRepr::Ports(ports),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveSettings {
    pub enabled: bool,
    pub ports: SaveSelection,
    /// Append the producer's job name to each port folder.
    pub job_name_in_port: bool,
}

impl SaveSettings {
    pub fn all() -> Self {
        Self {
            enabled: true,
            ports: SaveSelection::All,
            job_name_in_port: false,
        }
    }

    pub fn ports(ports: Vec<PortKey>) -> Self {
        Self {
            enabled: true,
            ports: SaveSelection::Ports(ports),
            job_name_in_port: false,
        }
    }
}

/// Writes selected valid ports of the current wave under `root`.
#[derive(Debug, Clone)]
pub struct PortPersistence {
    root: PathBuf,
    settings: SaveSettings,
}

impl PortPersistence {
    pub fn new(root: impl Into<PathBuf>, settings: SaveSettings) -> Self {
        Self {
            root: root.into(),
            settings,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> &SaveSettings {
        &self.settings
    }

    pub fn selects(&self, key: &PortKey) -> bool {
        if !self.settings.enabled {
            return false;
        }
        match &self.settings.ports {
            SaveSelection::All => true,
            SaveSelection::Ports(keys) => keys.contains(key),
        }
    }

    /// Folder for `key`, optionally suffixed with the producer name.
    pub fn port_dir(&self, key: &PortKey, job_name: &str) -> PathBuf {
        let folder = if self.settings.job_name_in_port {
            format!("{}_{}", key, job_name)
        } else {
            key.to_string()
        };
        self.root.join(sanitize(&folder))
    }

    /// Save every selected, valid, current-wave port. `job_names` is indexed
    /// by producer id. Failures are logged and skipped.
    pub fn save_wave(
        &self,
        store: &PortStore,
        job_names: &[&str],
        frame_name: &str,
        wave: u64,
    ) -> usize {
        if !self.settings.enabled {
            return 0;
        }
        let stem = if frame_name.is_empty() {
            format!("wave_{:06}", wave)
        } else {
            sanitize(frame_name)
        };

        let mut saved = 0;
        for (key, producer, slot) in store.valid_current() {
            if !self.selects(key) {
                continue;
            }
            let job_name = job_names.get(producer.index()).copied().unwrap_or("");
            let dir = self.port_dir(key, job_name);
            match save_buffer(&dir, &stem, slot.buffer()) {
                Ok(path) => {
                    saved += 1;
                    debug!(port = %key, wave, path = %path.display(), "Port saved");
                }
                Err(e) => warn!(port = %key, wave, error = %e, "Failed to save port"),
            }
        }
        saved
    }
}

/// Write `buffer` into `dir` as `<stem>.png` or `<stem>.json`.
pub fn save_buffer(dir: &Path, stem: &str, buffer: &PortBuffer) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;

    if let Some(array) = buffer.as_u8() {
        let shape = array.shape();
        let pixels = || array.iter().copied().collect::<Vec<u8>>();
        let image_path = dir.join(format!("{}.png", stem));
        match shape {
            &[h, w] => {
                let img = GrayImage::from_raw(w as u32, h as u32, pixels())
                    .ok_or_else(|| WavepipeError::Serialization("gray buffer size".into()))?;
                img.save(&image_path)?;
                return Ok(image_path);
            }
            &[h, w, 3] => {
                let img = RgbImage::from_raw(w as u32, h as u32, pixels())
                    .ok_or_else(|| WavepipeError::Serialization("rgb buffer size".into()))?;
                img.save(&image_path)?;
                return Ok(image_path);
            }
            _ => {}
        }
    }

    let json_path = dir.join(format!("{}.json", stem));
    let file = fs::File::create(&json_path)?;
    serde_json::to_writer(std::io::BufWriter::new(file), buffer)?;
    Ok(json_path)
}

/// Keep names usable as single path components.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::level::PyramidLevel;
    use ndarray::{ArrayD, IxDyn};

    #[test]
    fn test_selection_deserializes_all_or_list() {
        let all: SaveSettings =
            serde_json::from_str(r#"{"enabled": true, "ports": "ALL"}"#).unwrap();
        assert_eq!(all.ports, SaveSelection::All);

        let some: SaveSettings =
            serde_json::from_str(r#"{"enabled": true, "ports": ["RAW_L0", "EDGES_LC0"]}"#)
                .unwrap();
        assert_eq!(
            some.ports,
            SaveSelection::Ports(vec![
                PortKey::new("RAW", PyramidLevel::L0),
                PortKey::new("EDGES", PyramidLevel::LC0),
            ])
        );
        assert_eq!(serde_json::to_string(&SaveSelection::All).unwrap(), "\"ALL\"");
    }

    #[test]
    fn test_selects_respects_enabled_flag() {
        let key = PortKey::new("RAW", PyramidLevel::L0);
        let disabled = PortPersistence::new("out", SaveSettings::default());
        assert!(!disabled.selects(&key));

        let listed = PortPersistence::new("out", SaveSettings::ports(vec![key.clone()]));
        assert!(listed.selects(&key));
        assert!(!listed.selects(&PortKey::new("RAW", PyramidLevel::L1)));
    }

    #[test]
    fn test_port_dir_with_job_name() {
        let key = PortKey::new("RAW_DELAY_1", PyramidLevel::L0);
        let mut settings = SaveSettings::all();
        settings.job_name_in_port = true;
        let persistence = PortPersistence::new("/out", settings);
        assert_eq!(
            persistence.port_dir(&key, "COPY RAW_L0 W1 L0"),
            PathBuf::from("/out/RAW_DELAY_1_L0_COPY RAW_L0 W1 L0")
        );
    }

    #[test]
    fn test_save_buffer_formats() {
        let dir = tempfile::tempdir().unwrap();

        let gray = PortBuffer::from(ArrayD::from_elem(IxDyn(&[2, 3]), 200u8));
        let path = save_buffer(dir.path(), "f0", &gray).unwrap();
        assert_eq!(path.extension().unwrap(), "png");
        let decoded = image::open(&path).unwrap().to_luma8();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(2, 1).0, [200]);

        let table = PortBuffer::from(ArrayD::from_elem(IxDyn(&[2, 7]), 1.5f32));
        let path = save_buffer(dir.path(), "f0", &table).unwrap();
        assert_eq!(path.extension().unwrap(), "json");
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("1.5"));
    }
}
