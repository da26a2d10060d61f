//! Job registry and builders.
//!
//! [`PipelineBuilder`] collects [`JobDescriptor`]s in registration order. Each
//! registration is validated immediately so wiring mistakes surface at the
//! call that made them. [`PipelineBuilder::build`] resolves the order and
//! allocates the port store.

use crate::config::RunConfig;
use crate::pipeline::compiler::DependencyResolver;
use crate::pipeline::error::{ConfigError, ConfigResult};
use crate::pipeline::executor::Pipeline;
use crate::pipeline::job::{AnyJob, BuiltinJob, JobDescriptor};
use crate::pipeline::jobs::{CopyPortConfig, CopyPortJob, GetFrameConfig, GetFrameJob};
use crate::pipeline::level::FrameGeometry;
use crate::pipeline::port::{DType, OutputSpec, PortKey, MAX_WAVE_OFFSET};
use tracing::debug;

/// Ordered collection of job descriptors, frozen by [`build`](Self::build).
pub struct PipelineBuilder {
    geometry: FrameGeometry,
    jobs: Vec<JobDescriptor>,
}

impl PipelineBuilder {
    pub fn new(geometry: FrameGeometry) -> Self {
        Self {
            geometry,
            jobs: Vec::new(),
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.frame.clone())
    }

    pub fn geometry(&self) -> &FrameGeometry {
        &self.geometry
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Registered job names, in registration order.
    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|job| job.name()).collect()
    }

    /// Declaration of a port some registered job produces.
    pub fn output_spec(&self, key: &PortKey) -> Option<&OutputSpec> {
        self.jobs
            .iter()
            .flat_map(|job| job.outputs.iter())
            .find(|spec| &spec.key == key)
    }

    /// Register a job and return its output keys for chaining.
    ///
    /// Registering a descriptor identical to an existing one (same name and
    /// wiring) is a no-op that returns the existing outputs.
    pub fn register(&mut self, desc: JobDescriptor) -> ConfigResult<Vec<PortKey>> {
        if let Some(existing) = self.jobs.iter().find(|job| job.name == desc.name) {
            if existing.same_configuration(&desc) {
                debug!(job = existing.name(), "Job already registered");
                return Ok(existing.outputs.iter().map(|spec| spec.key.clone()).collect());
            }
            return Err(ConfigError::NameCollision(desc.name));
        }

        self.validate(&desc)?;

        let keys: Vec<PortKey> = desc.outputs.iter().map(|spec| spec.key.clone()).collect();
        debug!(
            job = desc.name(),
            inputs = desc.inputs.len(),
            outputs = keys.len(),
            "Job registered"
        );
        self.jobs.push(desc);
        Ok(keys)
    }

    fn validate(&self, desc: &JobDescriptor) -> ConfigResult<()> {
        if desc.outputs.is_empty() {
            return Err(ConfigError::NoOutputs {
                job: desc.name.clone(),
            });
        }
        desc.level.validate()?;

        for input in &desc.inputs {
            if input.key.name.is_empty() {
                return Err(ConfigError::InvalidParameter {
                    job: desc.name.clone(),
                    message: "input port name is empty".to_string(),
                });
            }
            input.key.level.validate()?;
            if input.wave_offset > MAX_WAVE_OFFSET {
                return Err(ConfigError::InvalidParameter {
                    job: desc.name.clone(),
                    message: format!(
                        "wave offset {} of {} exceeds {}",
                        input.wave_offset, input.key, MAX_WAVE_OFFSET
                    ),
                });
            }
        }

        for (i, spec) in desc.outputs.iter().enumerate() {
            if spec.key.name.is_empty() {
                return Err(ConfigError::InvalidParameter {
                    job: desc.name.clone(),
                    message: "output port name is empty".to_string(),
                });
            }
            spec.shape.resolve(spec.key.level, spec.color, &self.geometry)?;

            if desc.outputs[..i].iter().any(|other| other.key == spec.key) {
                return Err(ConfigError::DuplicateProducer {
                    port: spec.key.clone(),
                    first: desc.name.clone(),
                    second: desc.name.clone(),
                });
            }
            if let Some(other) = self
                .jobs
                .iter()
                .find(|job| job.outputs.iter().any(|o| o.key == spec.key))
            {
                return Err(ConfigError::DuplicateProducer {
                    port: spec.key.clone(),
                    first: other.name.clone(),
                    second: desc.name.clone(),
                });
            }
        }
        Ok(())
    }

    // ── Builtin builders ──

    /// Copy each wave's frame into `<output>_<level>`.
    pub fn get_frame_job(&mut self, config: &GetFrameConfig) -> ConfigResult<PortKey> {
        let key = PortKey::new(config.output.clone(), config.level);
        let desc = JobDescriptor::new(
            config.action(),
            config.level,
            AnyJob::Builtin(BuiltinJob::GetFrame(GetFrameJob::new())),
        )
        .with_output(OutputSpec::image(key.clone(), DType::U8, config.color))
        .with_params(serde_json::to_value(config).unwrap_or_default());

        self.register(desc)?;
        Ok(key)
    }

    /// Copy a port as it was `wave_offset` waves ago into a new port with the
    /// same shape and dtype, optionally masked by a u8 port.
    pub fn copy_port_job(&mut self, config: &CopyPortConfig) -> ConfigResult<PortKey> {
        let input = config.input_ref();
        let mask = config.mask_ref();
        let action = "COPY";

        let mut desc = JobDescriptor::new(
            action,
            config.level,
            AnyJob::Builtin(BuiltinJob::CopyPort(CopyPortJob::new(config))),
        )
        .with_input(input.clone());
        if let Some(mask) = &mask {
            desc = desc.with_input(mask.clone());
        }
        let job = desc.name().to_string();

        if config.input.is_empty() {
            return Err(ConfigError::InvalidParameter {
                job,
                message: "input port name is empty".to_string(),
            });
        }

        let source = self
            .output_spec(&input.key)
            .ok_or_else(|| ConfigError::MissingProducer {
                job: job.clone(),
                port: input.key.clone(),
            })?
            .clone();

        if let Some(mask) = &mask {
            let mask_spec =
                self.output_spec(&mask.key)
                    .ok_or_else(|| ConfigError::MissingProducer {
                        job: job.clone(),
                        port: mask.key.clone(),
                    })?;
            if mask_spec.dtype != DType::U8 {
                return Err(ConfigError::InvalidParameter {
                    job,
                    message: format!("mask {} must be u8, found {:?}", mask.key, mask_spec.dtype),
                });
            }
            let mask_shape =
                mask_spec
                    .shape
                    .resolve(mask.key.level, mask_spec.color, &self.geometry)?;
            let source_shape = source
                .shape
                .resolve(input.key.level, source.color, &self.geometry)?;
            if mask_shape != source_shape {
                return Err(ConfigError::InvalidParameter {
                    job,
                    message: format!(
                        "mask shape {:?} differs from input shape {:?}",
                        mask_shape, source_shape
                    ),
                });
            }
        }

        let key = config.output_key();
        let desc = desc
            .with_output(OutputSpec {
                key: key.clone(),
                shape: source.shape.clone(),
                dtype: source.dtype,
                color: source.color,
            })
            .with_params(serde_json::to_value(config).unwrap_or_default());

        self.register(desc)?;
        Ok(key)
    }

    /// Resolve the execution order and allocate ports.
    pub fn build(self) -> ConfigResult<Pipeline> {
        let plan = DependencyResolver::resolve(&self.jobs)?;
        Pipeline::new(self.jobs, plan, self.geometry)
    }
}
