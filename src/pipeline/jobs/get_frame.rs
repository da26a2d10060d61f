//! GetFrameJob: copies the wave's input frame into a port.
//!
//! Usually the first job of a pipeline. Its output is what every other job
//! ultimately reads from.

use crate::pipeline::error::JobError;
use crate::pipeline::job::{InitState, JobContext};
use crate::pipeline::level::PyramidLevel;
use serde::{Deserialize, Serialize};

/// Parameters of the frame-acquisition job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetFrameConfig {
    /// Base name of the output port.
    pub output: String,
    pub level: PyramidLevel,
    /// Three-channel `[h, w, 3]` output instead of `[h, w]`.
    pub color: bool,
}

impl Default for GetFrameConfig {
    fn default() -> Self {
        Self {
            output: "RAW".to_string(),
            level: PyramidLevel::L0,
            color: true,
        }
    }
}

impl GetFrameConfig {
    pub fn action(&self) -> String {
        format!("Get frame {}", self.output)
    }
}

#[derive(Debug, Default)]
pub struct GetFrameJob;

impl GetFrameJob {
    pub fn new() -> Self {
        Self
    }

    pub fn init(&mut self) -> InitState {
        InitState::Init
    }

    pub fn run(&mut self, ctx: &mut JobContext<'_>) -> Result<(), JobError> {
        let frame = ctx.frame();
        let out = ctx.output(0)?;
        let key = out.key().clone();
        out.buffer_mut().copy_from(&key, &frame.data)?;
        out.set_valid();
        Ok(())
    }
}
