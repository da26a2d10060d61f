//! # wavepipe-rs: wave-scheduled job graphs for image-processing experiments
//!
//! An experiment is a set of jobs wired together through named, leveled
//! ports. Every frame pulled from a [`source::FrameSource`] starts a *wave*:
//! each job runs once, in an order resolved from its same-wave inputs, and
//! may also read any port as it was a fixed number of waves ago.
//!
//! ## Architecture
//!
//! - **Registry**: [`pipeline::PipelineBuilder`] validates and collects job descriptors
//! - **Resolver**: [`pipeline::DependencyResolver`] computes a stable topological order
//! - **Store**: [`pipeline::PortStore`] owns every buffer and its wave history
//! - **Executor**: [`pipeline::Pipeline`] runs the waves, isolates failures and times jobs
//! - **Outputs**: KPI CSV ([`pipeline::kpi`]), saved ports ([`persist`]) and a JSON manifest
//!
//! ## Example
//!
//! ```ignore
//! use wavepipe_rs::pipeline::{CopyPortConfig, CsvKpiSink, GetFrameConfig, PipelineBuilder};
//! use wavepipe_rs::source::{ColorMode, FolderSource};
//! use wavepipe_rs::RunConfig;
//!
//! let config = RunConfig::load("run.toml")?;
//! let mut builder = PipelineBuilder::from_config(&config);
//! let raw = builder.get_frame_job(&GetFrameConfig::default())?;
//! builder.copy_port_job(&CopyPortConfig::new(raw.name.clone(), raw.level, 1))?;
//!
//! let mut pipeline = builder.build()?;
//! let mut source = FolderSource::open(&config.input_folder, ColorMode::Rgb)?;
//! let mut sink = CsvKpiSink::new(config.kpi_log_path());
//! let summary = pipeline.run(&mut source, &mut sink)?;
//! ```

pub mod config;
pub mod error;
pub mod persist;
pub mod pipeline;
pub mod source;

// Re-export commonly used types
pub use config::RunConfig;
pub use error::{Result, WavepipeError};
pub use persist::{PortPersistence, SaveSelection, SaveSettings};
pub use pipeline::{
    ConfigError, JobContext, JobError, JobPlugin, Pipeline, PipelineBuilder, PortKey, PortRef,
    PyramidLevel, RunError, RunSummary,
};
pub use source::{Frame, FrameSource};
