//! Frames decoded from the image files of one directory, in file-name order.

use super::{Frame, FrameSource};
use crate::error::{Result, ResultExt, WavepipeError};
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File extensions picked up by [`FolderSource`] (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// Channel layout frames are decoded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    /// `[h, w]` luma.
    Gray,
    /// `[h, w, 3]` RGB.
    #[default]
    Rgb,
}

#[derive(Debug, Clone)]
pub struct FolderSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    mode: ColorMode,
}

impl FolderSource {
    /// List the images in `dir`. Files are decoded lazily, one per wave.
    pub fn open(dir: impl AsRef<Path>, mode: ColorMode) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to read frame folder {}", dir.display()))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && is_image(&path) {
                files.push(path);
            }
        }
        files.sort();

        debug!(dir = %dir.display(), frames = files.len(), "Frame folder opened");
        Ok(Self {
            dir,
            files,
            cursor: 0,
            mode,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn mode(&self) -> ColorMode {
        self.mode
    }

    /// `(width, height)` of the first decodable frame, without consuming it.
    pub fn first_image_dimensions(&self) -> Option<(u32, u32)> {
        self.files
            .iter()
            .find_map(|path| image::image_dimensions(path).ok())
    }

    /// Decode one file into a frame named after its stem.
    pub fn decode(path: &Path, mode: ColorMode) -> Result<Frame> {
        let img = image::open(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| WavepipeError::Config(format!("{} has no file name", path.display())))?;

        let data = match mode {
            ColorMode::Gray => {
                let luma = img.to_luma8();
                let (w, h) = luma.dimensions();
                ArrayD::from_shape_vec(IxDyn(&[h as usize, w as usize]), luma.into_raw())?
            }
            ColorMode::Rgb => {
                let rgb = img.to_rgb8();
                let (w, h) = rgb.dimensions();
                ArrayD::from_shape_vec(IxDyn(&[h as usize, w as usize, 3]), rgb.into_raw())?
            }
        };
        Ok(Frame::new(name, data))
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

impl FrameSource for FolderSource {
    fn next_frame(&mut self) -> Option<Frame> {
        while let Some(path) = self.files.get(self.cursor) {
            self.cursor += 1;
            match Self::decode(path, self.mode) {
                Ok(frame) => return Some(frame),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping undecodable frame"),
            }
        }
        None
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.files.len() - self.cursor)
    }
}
