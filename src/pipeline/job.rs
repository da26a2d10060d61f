//! Job abstraction for the pipeline.
//!
//! Two-layer design:
//! - **`JobPlugin` trait**: the two-phase contract every external job body
//!   satisfies (`init` once, `run` every wave).
//! - **`BuiltinJob` enum**: the plumbing jobs shipped with the crate, matched
//!   directly instead of boxed.
//!
//! `AnyJob` wraps either variant so the executor can handle both uniformly.
//! A [`JobDescriptor`] couples a body with its wiring: derived name, input
//! references and output declarations.

use crate::pipeline::error::{JobError, PortError};
use crate::pipeline::jobs::{CopyPortJob, GetFrameJob};
use crate::pipeline::level::PyramidLevel;
use crate::pipeline::port::{OutputSpec, PortKey, PortRef};
use crate::pipeline::store::{OutputPort, PortSlot, PortStore};
use crate::source::Frame;
use serde_json::Value;

/// Result of a job's init phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    /// Ready; main runs every wave.
    Init,
    /// Not usable for this run; main is never called.
    NotInit,
}

impl From<bool> for InitState {
    fn from(ready: bool) -> Self {
        if ready {
            InitState::Init
        } else {
            InitState::NotInit
        }
    }
}

/// Context passed to a job's main operation for one wave.
///
/// Reads go to the shared store; writes are only possible through the job's
/// own checked-out outputs.
pub struct JobContext<'a> {
    store: &'a PortStore,
    outputs: &'a mut [OutputPort],
    inputs: &'a [PortRef],
    frame: &'a Frame,
    wave: u64,
    job_name: &'a str,
}

impl<'a> JobContext<'a> {
    pub(crate) fn new(
        store: &'a PortStore,
        outputs: &'a mut [OutputPort],
        inputs: &'a [PortRef],
        frame: &'a Frame,
        wave: u64,
        job_name: &'a str,
    ) -> Self {
        Self {
            store,
            outputs,
            inputs,
            frame,
            wave,
            job_name,
        }
    }

    /// Monotonic wave index, starting at 0.
    pub fn wave(&self) -> u64 {
        self.wave
    }

    pub fn job_name(&self) -> &str {
        self.job_name
    }

    /// The frame consumed by this wave.
    pub fn frame(&self) -> &'a Frame {
        self.frame
    }

    /// Declared inputs, in registration order.
    pub fn inputs(&self) -> &'a [PortRef] {
        self.inputs
    }

    /// Read any registered port at its own offset.
    pub fn get(&self, port: &PortRef) -> Result<&'a PortSlot, PortError> {
        self.store.get(&port.key, port.wave_offset)
    }

    pub fn read(&self, key: &PortKey, wave_offset: u32) -> Result<&'a PortSlot, PortError> {
        self.store.get(key, wave_offset)
    }

    /// Declared input `index`, at its declared offset.
    pub fn input(&self, index: usize) -> Result<&'a PortSlot, JobError> {
        let port = self
            .inputs
            .get(index)
            .ok_or_else(|| JobError::Failed(format!("no input #{} declared", index)))?;
        Ok(self.get(port)?)
    }

    /// Like [`input`](Self::input) but also requires the slot to be valid.
    pub fn valid_input(&self, index: usize) -> Result<&'a PortSlot, JobError> {
        let slot = self.input(index)?;
        if !slot.is_valid() {
            return Err(JobError::InvalidInput(self.inputs[index].key.clone()));
        }
        Ok(slot)
    }

    /// Declared output `index`, writable.
    pub fn output(&mut self, index: usize) -> Result<&mut OutputPort, JobError> {
        self.outputs
            .get_mut(index)
            .ok_or_else(|| JobError::Failed(format!("no output #{} declared", index)))
    }

    pub fn outputs_mut(&mut self) -> &mut [OutputPort] {
        self.outputs
    }
}

/// Trait for pluggable/user-defined jobs.
pub trait JobPlugin: Send {
    /// Called once, before the job's first wave.
    fn init(&mut self) -> InitState {
        InitState::Init
    }

    /// Called every wave while the job is active.
    fn run(&mut self, ctx: &mut JobContext<'_>) -> Result<(), JobError>;
}

/// Built-in plumbing jobs.
pub enum BuiltinJob {
    GetFrame(GetFrameJob),
    CopyPort(CopyPortJob),
}

impl BuiltinJob {
    pub fn init(&mut self) -> InitState {
        match self {
            BuiltinJob::GetFrame(j) => j.init(),
            BuiltinJob::CopyPort(j) => j.init(),
        }
    }

    pub fn run(&mut self, ctx: &mut JobContext<'_>) -> Result<(), JobError> {
        match self {
            BuiltinJob::GetFrame(j) => j.run(ctx),
            BuiltinJob::CopyPort(j) => j.run(ctx),
        }
    }
}

/// Wrapper that holds either a built-in job (enum dispatch) or a plugin (trait object).
pub enum AnyJob {
    Builtin(BuiltinJob),
    Plugin(Box<dyn JobPlugin>),
}

impl AnyJob {
    pub fn plugin(job: impl JobPlugin + 'static) -> Self {
        AnyJob::Plugin(Box::new(job))
    }

    pub fn init(&mut self) -> InitState {
        match self {
            AnyJob::Builtin(j) => j.init(),
            AnyJob::Plugin(j) => j.init(),
        }
    }

    pub fn run(&mut self, ctx: &mut JobContext<'_>) -> Result<(), JobError> {
        match self {
            AnyJob::Builtin(j) => j.run(ctx),
            AnyJob::Plugin(j) => j.run(ctx),
        }
    }
}

impl std::fmt::Debug for AnyJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnyJob::Builtin(BuiltinJob::GetFrame(_)) => write!(f, "Builtin(GetFrame)"),
            AnyJob::Builtin(BuiltinJob::CopyPort(_)) => write!(f, "Builtin(CopyPort)"),
            AnyJob::Plugin(_) => write!(f, "Plugin"),
        }
    }
}

/// Deterministic job name: action, input keys, their wave offsets, and level.
///
/// `"COPY RAW_L0 W1 L0"`; jobs without inputs get `"<action> <level>"`.
pub fn derive_job_name(action: &str, inputs: &[PortRef], level: PyramidLevel) -> String {
    if inputs.is_empty() {
        return format!("{} {}", action, level);
    }
    let keys: Vec<String> = inputs.iter().map(|p| p.key.to_string()).collect();
    let offsets: Vec<String> = inputs.iter().map(|p| p.wave_offset.to_string()).collect();
    format!("{} {} W{} {}", action, keys.join(" "), offsets.join(","), level)
}

/// One registered job: wiring plus body.
#[derive(Debug)]
pub struct JobDescriptor {
    pub(crate) name: String,
    explicit_name: bool,
    pub(crate) action: String,
    pub(crate) level: PyramidLevel,
    pub(crate) inputs: Vec<PortRef>,
    pub(crate) outputs: Vec<OutputSpec>,
    pub(crate) params: Value,
    pub(crate) body: AnyJob,
}

impl JobDescriptor {
    pub fn new(action: impl Into<String>, level: PyramidLevel, body: AnyJob) -> Self {
        let action = action.into();
        Self {
            name: derive_job_name(&action, &[], level),
            explicit_name: false,
            action,
            level,
            inputs: Vec::new(),
            outputs: Vec::new(),
            params: Value::Null,
            body,
        }
    }

    pub fn with_input(mut self, input: PortRef) -> Self {
        self.inputs.push(input);
        if !self.explicit_name {
            self.name = derive_job_name(&self.action, &self.inputs, self.level);
        }
        self
    }

    pub fn with_output(mut self, output: OutputSpec) -> Self {
        self.outputs.push(output);
        self
    }

    /// Parameters recorded in the manifest and compared on re-registration.
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    /// Override the derived name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self.explicit_name = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn level(&self) -> PyramidLevel {
        self.level
    }

    pub fn inputs(&self) -> &[PortRef] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OutputSpec] {
        &self.outputs
    }

    pub fn params(&self) -> &Value {
        &self.params
    }

    /// Same name and same wiring: registering `other` again is a no-op.
    pub fn same_configuration(&self, other: &JobDescriptor) -> bool {
        self.name == other.name
            && self.action == other.action
            && self.level == other.level
            && self.inputs == other.inputs
            && self.outputs == other.outputs
            && self.params == other.params
    }
}
