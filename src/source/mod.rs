//! Frame sources: the finite, restartable sequence that drives the waves.
//!
//! The executor pulls exactly one [`Frame`] per wave and stops when the
//! source is exhausted.

mod channel;
mod folder;

pub use channel::{channel_source, ChannelSource};
pub use folder::{ColorMode, FolderSource, IMAGE_EXTENSIONS};

use crate::pipeline::port::PortBuffer;
use ndarray::ArrayD;

/// One input frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Used as the file stem when ports are saved.
    pub name: String,
    pub data: PortBuffer,
}

impl Frame {
    pub fn new(name: impl Into<String>, data: impl Into<PortBuffer>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// `[h, w]` or `[h, w, 3]`.
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn is_color(&self) -> bool {
        self.shape().len() == 3 && self.shape()[2] == 3
    }

    pub fn as_u8(&self) -> Option<&ArrayD<u8>> {
        self.data.as_u8()
    }
}

/// Finite, restartable sequence of frames.
pub trait FrameSource {
    /// Next frame, or `None` once exhausted.
    fn next_frame(&mut self) -> Option<Frame>;

    /// Restart from the first frame.
    fn reset(&mut self);

    /// Remaining frames, when known.
    fn len_hint(&self) -> Option<usize> {
        None
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Option<Frame> {
        (**self).next_frame()
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn len_hint(&self) -> Option<usize> {
        (**self).len_hint()
    }
}

/// Frames held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    frames: Vec<Frame>,
    cursor: usize,
}

impl MemorySource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames, cursor: 0 }
    }

    /// `count` copies of `frame`, named by index.
    pub fn repeat(frame: &Frame, count: usize) -> Self {
        let frames = (0..count)
            .map(|i| Frame {
                name: format!("{:06}", i),
                data: frame.data.clone(),
            })
            .collect();
        Self::new(frames)
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Option<Frame> {
        let frame = self.frames.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(frame)
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.frames.len() - self.cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn gray(value: u8) -> Frame {
        Frame::new("f", ArrayD::from_elem(IxDyn(&[2, 3]), value))
    }

    #[test]
    fn test_memory_source_is_restartable() {
        let mut source = MemorySource::new(vec![gray(1), gray(2)]);
        assert_eq!(source.len_hint(), Some(2));
        assert_eq!(source.next_frame().unwrap().as_u8().unwrap()[[0, 0]], 1);
        assert_eq!(source.next_frame().unwrap().as_u8().unwrap()[[0, 0]], 2);
        assert!(source.next_frame().is_none());
        assert_eq!(source.len_hint(), Some(0));

        source.reset();
        assert_eq!(source.next_frame().unwrap().as_u8().unwrap()[[0, 0]], 1);
    }

    #[test]
    fn test_repeat_names_frames() {
        let mut source = MemorySource::repeat(&gray(0), 3);
        let names: Vec<String> = std::iter::from_fn(|| source.next_frame())
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["000000", "000001", "000002"]);
    }

    #[test]
    fn test_frame_color_detection() {
        assert!(!gray(0).is_color());
        let rgb = Frame::new("c", ArrayD::<u8>::zeros(IxDyn(&[2, 2, 3])));
        assert!(rgb.is_color());
    }
}
