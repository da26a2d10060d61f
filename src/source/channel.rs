//! Frames pushed by another thread through a crossbeam channel.
//!
//! The executor still consumes frames on its own thread; the channel only
//! decouples acquisition. The source is exhausted once every sender is dropped.

use super::{Frame, FrameSource};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::time::Duration;

pub struct ChannelSource {
    rx: Receiver<Frame>,
    timeout: Option<Duration>,
}

/// Create a bounded frame channel. The sender blocks once `capacity` frames
/// are queued.
pub fn channel_source(capacity: usize) -> (Sender<Frame>, ChannelSource) {
    let (tx, rx) = bounded(capacity);
    (tx, ChannelSource { rx, timeout: None })
}

impl ChannelSource {
    pub fn from_receiver(rx: Receiver<Frame>) -> Self {
        Self { rx, timeout: None }
    }

    /// Treat the source as exhausted when no frame arrives within `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl FrameSource for ChannelSource {
    fn next_frame(&mut self) -> Option<Frame> {
        match self.timeout {
            Some(timeout) => self.rx.recv_timeout(timeout).ok(),
            None => self.rx.recv().ok(),
        }
    }

    /// A channel cannot replay; stale queued frames are dropped instead.
    fn reset(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }

    fn len_hint(&self) -> Option<usize> {
        None
    }
}
