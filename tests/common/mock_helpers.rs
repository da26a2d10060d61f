//! Test job plugins with shared, inspectable state

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use wavepipe_rs::pipeline::{AbortHandle, InitState, JobContext, JobError, PortKey};

/// Shared call counter.
pub type Counter = Arc<AtomicU64>;

pub fn counter() -> Counter {
    Arc::new(AtomicU64::new(0))
}

pub fn count(counter: &Counter) -> u64 {
    counter.load(Ordering::SeqCst)
}

fn write_value(ctx: &mut JobContext<'_>, value: u32) -> Result<(), JobError> {
    let out = ctx.output(0)?;
    let array = out
        .buffer_mut()
        .as_u32_mut()
        .ok_or_else(|| JobError::Failed("expected a u32 output".to_string()))?;
    array.fill(value);
    out.set_valid();
    Ok(())
}

fn input_value(ctx: &JobContext<'_>, index: usize) -> Result<u32, JobError> {
    let slot = ctx.valid_input(index)?;
    slot.buffer()
        .as_u32()
        .and_then(|a| a.iter().next().copied())
        .ok_or_else(|| JobError::Failed("expected a u32 input".to_string()))
}

/// Writes the wave index to output 0.
#[derive(Default)]
pub struct ValueWriter {
    pub calls: Counter,
}

impl wavepipe_rs::JobPlugin for ValueWriter {
    fn run(&mut self, ctx: &mut JobContext<'_>) -> Result<(), JobError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let wave = ctx.wave() as u32;
        write_value(ctx, wave)
    }
}

/// Writes the sum of all declared inputs.
#[derive(Default)]
pub struct Adder {
    pub calls: Counter,
}

impl wavepipe_rs::JobPlugin for Adder {
    fn run(&mut self, ctx: &mut JobContext<'_>) -> Result<(), JobError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut sum = 0;
        for i in 0..ctx.inputs().len() {
            sum += input_value(ctx, i)?;
        }
        write_value(ctx, sum)
    }
}

/// Writes the wave index, but fails after writing on one wave.
pub struct FailOnWave {
    pub wave: u64,
}

impl wavepipe_rs::JobPlugin for FailOnWave {
    fn run(&mut self, ctx: &mut JobContext<'_>) -> Result<(), JobError> {
        let wave = ctx.wave();
        write_value(ctx, wave as u32)?;
        if wave == self.wave {
            return Err(JobError::Failed(format!("boom on wave {}", self.wave)));
        }
        Ok(())
    }
}

/// Reports NOT_INIT; counts main calls, which should never happen.
#[derive(Default)]
pub struct NotInitJob {
    pub init_calls: Counter,
    pub run_calls: Counter,
}

impl wavepipe_rs::JobPlugin for NotInitJob {
    fn init(&mut self) -> InitState {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        InitState::NotInit
    }

    fn run(&mut self, ctx: &mut JobContext<'_>) -> Result<(), JobError> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        write_value(ctx, 0)
    }
}

/// Records `(wave, value)` read from input 0 and forwards the value.
#[derive(Default)]
pub struct OffsetReader {
    pub seen: Arc<Mutex<Vec<(u64, u32)>>>,
}

impl wavepipe_rs::JobPlugin for OffsetReader {
    fn run(&mut self, ctx: &mut JobContext<'_>) -> Result<(), JobError> {
        let value = input_value(ctx, 0)?;
        let wave = ctx.wave();
        if let Ok(mut seen) = self.seen.lock() {
            seen.push((wave, value));
        }
        write_value(ctx, value)
    }
}

/// Panics on one wave, writes the wave index otherwise.
pub struct Panicker {
    pub wave: u64,
}

impl wavepipe_rs::JobPlugin for Panicker {
    fn run(&mut self, ctx: &mut JobContext<'_>) -> Result<(), JobError> {
        let wave = ctx.wave();
        if wave == self.wave {
            panic!("panicking on wave {}", self.wave);
        }
        write_value(ctx, wave as u32)
    }
}

/// Reads a port that no job produces.
pub struct GhostReader {
    pub port: PortKey,
}

impl wavepipe_rs::JobPlugin for GhostReader {
    fn run(&mut self, ctx: &mut JobContext<'_>) -> Result<(), JobError> {
        ctx.read(&self.port, 0)?;
        write_value(ctx, 0)
    }
}

/// Requests an abort while running one wave.
pub struct AbortOnWave {
    pub wave: u64,
    pub handle: AbortHandle,
}

impl wavepipe_rs::JobPlugin for AbortOnWave {
    fn run(&mut self, ctx: &mut JobContext<'_>) -> Result<(), JobError> {
        let wave = ctx.wave();
        if wave == self.wave {
            self.handle.abort();
        }
        write_value(ctx, wave as u32)
    }
}

/// Writes a u8 image mask: 255 on the left half of each row, 0 on the right.
pub struct MaskWriter;

impl wavepipe_rs::JobPlugin for MaskWriter {
    fn run(&mut self, ctx: &mut JobContext<'_>) -> Result<(), JobError> {
        let out = ctx.output(0)?;
        let array = out
            .buffer_mut()
            .as_u8_mut()
            .ok_or_else(|| JobError::Failed("expected a u8 output".to_string()))?;
        let width = array.shape()[1];
        for (idx, value) in array.indexed_iter_mut() {
            *value = if idx[1] < width / 2 { 255 } else { 0 };
        }
        out.set_valid();
        Ok(())
    }
}
