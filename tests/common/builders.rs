//! Test data builders for creating test objects

use ndarray::{ArrayD, IxDyn};
use wavepipe_rs::pipeline::{
    AnyJob, DType, FrameGeometry, JobDescriptor, JobPlugin, OutputSpec, PortKey, PortRef,
    PortStore, PyramidLevel,
};
use wavepipe_rs::source::MemorySource;
use wavepipe_rs::Frame;

/// Port key at level 0.
pub fn key(name: &str) -> PortKey {
    PortKey::new(name, PyramidLevel::L0)
}

/// 8x4 frames keep buffers tiny.
pub fn small_geometry() -> FrameGeometry {
    FrameGeometry::new(8, 4)
}

/// Builder for test job descriptors with single-value u32 outputs at L0
pub struct JobBuilder {
    action: String,
    inputs: Vec<PortRef>,
    outputs: Vec<String>,
    name: Option<String>,
}

impl JobBuilder {
    pub fn new(action: &str) -> Self {
        Self {
            action: action.to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            name: None,
        }
    }

    pub fn input(mut self, name: &str, wave_offset: u32) -> Self {
        self.inputs.push(PortRef::new(name, PyramidLevel::L0, wave_offset));
        self
    }

    pub fn output(mut self, name: &str) -> Self {
        self.outputs.push(name.to_string());
        self
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn build(self, plugin: impl JobPlugin + 'static) -> JobDescriptor {
        let mut desc = JobDescriptor::new(self.action, PyramidLevel::L0, AnyJob::plugin(plugin));
        for input in self.inputs {
            desc = desc.with_input(input);
        }
        for output in self.outputs {
            desc = desc.with_output(OutputSpec::fixed(key(&output), vec![1], DType::U32));
        }
        if let Some(name) = self.name {
            desc = desc.with_name(name);
        }
        desc
    }
}

/// Gray frame filled with `value`.
pub fn gray_frame(name: &str, width: usize, height: usize, value: u8) -> Frame {
    Frame::new(name, ArrayD::from_elem(IxDyn(&[height, width]), value))
}

/// Gray frames whose pixels all equal the frame index.
pub fn frames(count: usize, width: usize, height: usize) -> MemorySource {
    MemorySource::new(
        (0..count)
            .map(|i| gray_frame(&format!("{:06}", i), width, height, i as u8))
            .collect(),
    )
}

/// The single value of a u32 port, `None` when unavailable or invalid.
pub fn read_u32(store: &PortStore, key: &PortKey, wave_offset: u32) -> Option<u32> {
    let slot = store.get(key, wave_offset).ok()?;
    if !slot.is_valid() {
        return None;
    }
    slot.buffer().as_u32()?.iter().next().copied()
}
