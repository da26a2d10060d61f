//! Pyramid levels and the geometry each one resolves to.
//!
//! Two families of levels exist:
//!
//! - `L<n>`: the configured frame size halved `n` times (floor, minimum 1).
//! - `LC<n>`: custom sizes listed in the run configuration, by index.

use crate::pipeline::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Highest index accepted for either level family.
pub const MAX_LEVEL_INDEX: u8 = 9;

/// A resolution tier at which a port is materialized.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PyramidLevel {
    /// Base geometry downscaled by `2^n`.
    Level(u8),
    /// Custom geometry from `FrameGeometry::custom_levels[n]`.
    Custom(u8),
}

impl PyramidLevel {
    pub const L0: PyramidLevel = PyramidLevel::Level(0);
    pub const L1: PyramidLevel = PyramidLevel::Level(1);
    pub const L2: PyramidLevel = PyramidLevel::Level(2);
    pub const LC0: PyramidLevel = PyramidLevel::Custom(0);

    #[inline]
    pub fn index(self) -> u8 {
        match self {
            PyramidLevel::Level(n) | PyramidLevel::Custom(n) => n,
        }
    }

    pub fn is_custom(self) -> bool {
        matches!(self, PyramidLevel::Custom(_))
    }

    pub fn validate(self) -> ConfigResult<()> {
        if self.index() > MAX_LEVEL_INDEX {
            return Err(ConfigError::Level {
                level: self.to_string(),
                message: format!("index exceeds {}", MAX_LEVEL_INDEX),
            });
        }
        Ok(())
    }
}

impl fmt::Display for PyramidLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PyramidLevel::Level(n) => write!(f, "L{}", n),
            PyramidLevel::Custom(n) => write!(f, "LC{}", n),
        }
    }
}

impl fmt::Debug for PyramidLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for PyramidLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (custom, digits) = if let Some(rest) = s.strip_prefix("LC") {
            (true, rest)
        } else if let Some(rest) = s.strip_prefix('L') {
            (false, rest)
        } else {
            return Err(format!("'{}' is not a pyramid level", s));
        };

        // Only plain decimal digits; "L+1" would otherwise parse.
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("'{}' is not a pyramid level", s));
        }
        let index: u8 = digits
            .parse()
            .map_err(|_| format!("'{}' has an out of range level index", s))?;
        if index > MAX_LEVEL_INDEX {
            return Err(format!("'{}' has an out of range level index", s));
        }
        Ok(if custom {
            PyramidLevel::Custom(index)
        } else {
            PyramidLevel::Level(index)
        })
    }
}

impl TryFrom<String> for PyramidLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PyramidLevel> for String {
    fn from(level: PyramidLevel) -> Self {
        level.to_string()
    }
}

/// Width and height of one custom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSize {
    pub width: usize,
    pub height: usize,
}

/// Input frame geometry and the custom level table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeometry {
    pub width: usize,
    pub height: usize,
    #[serde(default)]
    pub custom_levels: Vec<LevelSize>,
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            custom_levels: Vec::new(),
        }
    }
}

impl FrameGeometry {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            custom_levels: Vec::new(),
        }
    }

    pub fn with_custom_level(mut self, width: usize, height: usize) -> Self {
        self.custom_levels.push(LevelSize { width, height });
        self
    }

    /// `(height, width)` of a port materialized at `level`.
    pub fn dims(&self, level: PyramidLevel) -> ConfigResult<(usize, usize)> {
        level.validate()?;
        match level {
            PyramidLevel::Level(n) => {
                if self.width == 0 || self.height == 0 {
                    return Err(ConfigError::Level {
                        level: level.to_string(),
                        message: "frame geometry is empty".to_string(),
                    });
                }
                Ok(((self.height >> n).max(1), (self.width >> n).max(1)))
            }
            PyramidLevel::Custom(n) => self
                .custom_levels
                .get(n as usize)
                .map(|size| (size.height, size.width))
                .ok_or_else(|| ConfigError::Level {
                    level: level.to_string(),
                    message: format!(
                        "only {} custom level(s) configured",
                        self.custom_levels.len()
                    ),
                }),
        }
    }
}
