//! Wave-scheduled job pipeline.
//!
//! Jobs are registered with a [`PipelineBuilder`], each declaring the ports it
//! reads (with a wave offset) and the ports it writes. Building resolves a
//! linear execution order from the same-wave dependencies; running then
//! executes every active job once per frame, in that order.
//!
//! # Architecture
//!
//! ```text
//! FrameSource ──► [Get frame RAW L0] ──► RAW_L0 ──► [COPY RAW_L0 W1 L0] ──► RAW_DELAY_1_L0
//!                                          │                ▲
//!                                          └── ring (2) ────┘  (reads wave N-1)
//!                          KPI per (wave, job) ──► KpiSink (CSV)
//! ```
//!
//! # Design
//!
//! - **Enum dispatch for builtins**: `BuiltinJob`; plugins behind `Box<dyn JobPlugin>`.
//! - **Structured port keys**: `(name, level)` compared by value.
//! - **Time-buffered ports**: each port keeps a ring sized to its deepest reader.
//! - **Single writer by construction**: a job only gets `&mut` to its own outputs.
//! - **Failure isolation**: errors and panics stop at the job that raised them.

pub mod compiled_plan;
pub mod compiler;
pub mod error;
pub mod executor;
pub mod id;
pub mod job;
pub mod jobs;
pub mod kpi;
pub mod level;
pub mod manifest;
pub mod port;
pub mod registry;
pub mod store;

pub use compiled_plan::{CompiledPlan, PlanStats};
pub use compiler::DependencyResolver;
pub use error::{ConfigError, ConfigResult, JobError, PortError, RunError};
pub use executor::{
    AbortHandle, JobState, JobStats, JobSummary, Pipeline, RunSummary, StopFileWatcher,
};
pub use id::{JobId, PortId};
pub use job::{derive_job_name, AnyJob, BuiltinJob, InitState, JobContext, JobDescriptor, JobPlugin};
pub use jobs::{CopyPortConfig, GetFrameConfig};
pub use kpi::{CsvKpiSink, KpiCollector, KpiRecord, KpiRow, KpiSink, KpiTable, MemoryKpiSink};
pub use level::{FrameGeometry, LevelSize, PyramidLevel};
pub use manifest::{JobManifest, ManifestJob, ManifestPort};
pub use port::{DType, OutputSpec, PortBuffer, PortKey, PortRef, ShapeExpr, MAX_WAVE_OFFSET};
pub use registry::PipelineBuilder;
pub use store::{OutputPort, PortSlot, PortStore};
