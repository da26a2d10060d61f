//! CopyPortJob: copies a port, optionally from an earlier wave, into a new port.
//!
//! With a non-zero wave offset this is a delay line: the output on wave `W`
//! holds the input as it was on wave `W - offset`. An optional u8 mask zeroes
//! every element where the mask is zero. Without a mask the input acts as its
//! own mask, which is a plain copy.

use crate::pipeline::error::JobError;
use crate::pipeline::job::{InitState, JobContext};
use crate::pipeline::level::PyramidLevel;
use crate::pipeline::port::{PortKey, PortRef};
use serde::{Deserialize, Serialize};

/// Parameters of the copy/delay job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyPortConfig {
    /// Base name of the port to copy.
    pub input: String,
    #[serde(default = "default_level")]
    pub level: PyramidLevel,
    #[serde(default)]
    pub wave_offset: u32,
    /// Base name of a u8 mask port at the same level and offset.
    #[serde(default)]
    pub mask: Option<String>,
    /// Output base name. Derived from the input when absent.
    #[serde(default)]
    pub output: Option<String>,
}

fn default_level() -> PyramidLevel {
    PyramidLevel::L0
}

impl CopyPortConfig {
    pub fn new(input: impl Into<String>, level: PyramidLevel, wave_offset: u32) -> Self {
        Self {
            input: input.into(),
            level,
            wave_offset,
            mask: None,
            output: None,
        }
    }

    pub fn with_mask(mut self, mask: impl Into<String>) -> Self {
        self.mask = Some(mask.into());
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// `<INPUT>_DELAY_<offset>[_MASKED_BY_<MASK>]` unless overridden.
    pub fn output_name(&self) -> String {
        if let Some(output) = &self.output {
            return output.clone();
        }
        let mut name = format!("{}_DELAY_{}", self.input, self.wave_offset);
        if let Some(mask) = &self.mask {
            name.push_str("_MASKED_BY_");
            name.push_str(mask);
        }
        name
    }

    pub fn input_ref(&self) -> PortRef {
        PortRef::new(self.input.clone(), self.level, self.wave_offset)
    }

    pub fn mask_ref(&self) -> Option<PortRef> {
        self.mask
            .as_ref()
            .map(|mask| PortRef::new(mask.clone(), self.level, self.wave_offset))
    }

    pub fn output_key(&self) -> PortKey {
        PortKey::new(self.output_name(), self.level)
    }
}

#[derive(Debug)]
pub struct CopyPortJob {
    input: PortRef,
    mask: Option<PortRef>,
}

impl CopyPortJob {
    pub fn new(config: &CopyPortConfig) -> Self {
        Self {
            input: config.input_ref(),
            mask: config.mask_ref(),
        }
    }

    pub fn init(&mut self) -> InitState {
        InitState::Init
    }

    pub fn run(&mut self, ctx: &mut JobContext<'_>) -> Result<(), JobError> {
        let src = ctx.get(&self.input)?;
        if !src.is_valid() {
            return Err(JobError::InvalidInput(self.input.key.clone()));
        }

        // Fetch the mask before borrowing the output mutably.
        let mask = match &self.mask {
            Some(mask_ref) => {
                let slot = ctx.get(mask_ref)?;
                if !slot.is_valid() {
                    return Err(JobError::InvalidInput(mask_ref.key.clone()));
                }
                let array = slot.buffer().as_u8().ok_or_else(|| JobError::BufferMismatch {
                    key: mask_ref.key.clone(),
                    message: format!("mask must be u8, found {:?}", slot.buffer().dtype()),
                })?;
                Some(array)
            }
            None => None,
        };

        let out = ctx.output(0)?;
        let key = out.key().clone();
        match mask {
            Some(mask) => out.buffer_mut().copy_masked(&key, src.buffer(), mask)?,
            None => out.buffer_mut().copy_from(&key, src.buffer())?,
        }
        out.set_valid();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_name_derivation() {
        let config = CopyPortConfig::new("RAW", PyramidLevel::L0, 2);
        assert_eq!(config.output_name(), "RAW_DELAY_2");
        assert_eq!(
            config.clone().with_mask("ROI").output_name(),
            "RAW_DELAY_2_MASKED_BY_ROI"
        );
        assert_eq!(config.with_output("PREV").output_name(), "PREV");
    }

    #[test]
    fn test_refs_share_level_and_offset() {
        let config = CopyPortConfig::new("RAW", PyramidLevel::L1, 1).with_mask("ROI");
        assert_eq!(config.input_ref(), PortRef::new("RAW", PyramidLevel::L1, 1));
        assert_eq!(config.mask_ref(), Some(PortRef::new("ROI", PyramidLevel::L1, 1)));
        assert_eq!(config.output_key().to_string(), "RAW_DELAY_1_MASKED_BY_ROI_L1");
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: CopyPortConfig = serde_json::from_str(r#"{"input": "RAW"}"#).unwrap();
        assert_eq!(config, CopyPortConfig::new("RAW", PyramidLevel::L0, 0));
    }
}
