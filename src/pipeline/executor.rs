//! Pipeline executor: the wave loop.
//!
//! Each wave:
//! 1. Pull one frame from the source (or stop when it is exhausted).
//! 2. Rotate every port ring; current slots start invalid.
//! 3. Initialize jobs that have not been initialized yet.
//! 4. Execute active jobs in resolved order, timing each one.
//! 5. Save selected ports, if persistence is configured.
//!
//! A failing or panicking job only loses its own outputs for that wave. The
//! abort flag is checked between waves, never inside one.

use crate::pipeline::compiled_plan::CompiledPlan;
use crate::pipeline::error::{ConfigError, ConfigResult, JobError, PortError, RunError};
use crate::pipeline::id::{JobId, PortId};
use crate::pipeline::job::{InitState, JobContext, JobDescriptor};
use crate::pipeline::kpi::{KpiCollector, KpiSink};
use crate::pipeline::level::FrameGeometry;
use crate::pipeline::manifest::{JobManifest, ManifestJob, ManifestPort};
use crate::pipeline::store::{OutputPort, PortStore};
use crate::persist::PortPersistence;
use crate::source::{Frame, FrameSource};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Lifecycle of one job within a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    /// Registered, init not called yet.
    Unregistered,
    Initializing,
    Active,
    /// Init reported `NotInit` (or failed); main is never called.
    PermanentlySkipped,
}

/// Per-job counters over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    /// Waves where main returned `Ok`.
    pub runs: u64,
    /// Waves where main failed or panicked.
    pub failures: u64,
    /// Waves skipped for missing history or invalid inputs.
    pub skips: u64,
}

/// A registered job with its runtime state.
struct JobSlot {
    desc: JobDescriptor,
    state: JobState,
    outputs: Vec<PortId>,
    stats: JobStats,
}

/// Shared flag requesting the run loop to stop before the next wave.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Abort once `path` exists, checking every `poll`.
    pub fn watch_stop_file(&self, path: impl Into<PathBuf>, poll: Duration) -> StopFileWatcher {
        let path = path.into();
        let handle = self.clone();
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let thread = thread::spawn(move || loop {
            if path.exists() {
                tracing::info!("Stop file {} found, aborting run", path.display());
                handle.abort();
                break;
            }
            match stop_rx.recv_timeout(poll) {
                Err(RecvTimeoutError::Timeout) => {}
                _ => break,
            }
        });

        StopFileWatcher {
            stop_tx,
            thread: Some(thread),
        }
    }
}

/// Background thread behind [`AbortHandle::watch_stop_file`]. Stops on drop.
pub struct StopFileWatcher {
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for StopFileWatcher {
    fn drop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub name: String,
    pub state: JobState,
    pub stats: JobStats,
}

/// Outcome of [`Pipeline::run`].
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub waves: u64,
    pub aborted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Jobs in execution order.
    pub jobs: Vec<JobSummary>,
}

impl RunSummary {
    pub fn job(&self, name: &str) -> Option<&JobSummary> {
        self.jobs.iter().find(|job| job.name == name)
    }

    pub fn total_failures(&self) -> u64 {
        self.jobs.iter().map(|job| job.stats.failures).sum()
    }
}

/// A resolved, runnable pipeline.
pub struct Pipeline {
    jobs: Vec<JobSlot>,
    plan: CompiledPlan,
    store: PortStore,
    geometry: FrameGeometry,
    kpi: KpiCollector,
    next_wave: u64,
    max_waves: Option<u64>,
    abort: AbortHandle,
    persistence: Option<PortPersistence>,
}

impl Pipeline {
    /// Allocate ports for `jobs` (in registry order) according to `plan`.
    pub(crate) fn new(
        jobs: Vec<JobDescriptor>,
        plan: CompiledPlan,
        geometry: FrameGeometry,
    ) -> ConfigResult<Self> {
        let mut store = PortStore::new();
        let mut slots = Vec::with_capacity(jobs.len());

        for (idx, desc) in jobs.into_iter().enumerate() {
            let producer = JobId(idx as u32);
            let mut outputs = Vec::with_capacity(desc.outputs.len());
            for spec in &desc.outputs {
                let shape = spec.shape.resolve(spec.key.level, spec.color, &geometry)?;
                outputs.push(store.register(
                    spec.key.clone(),
                    shape,
                    spec.dtype,
                    spec.color,
                    producer,
                )?);
            }
            slots.push(JobSlot {
                desc,
                state: JobState::Unregistered,
                outputs,
                stats: JobStats::default(),
            });
        }

        for slot in &slots {
            for input in &slot.desc.inputs {
                store
                    .retain(&input.key, input.wave_offset)
                    .map_err(|_| ConfigError::MissingProducer {
                        job: slot.desc.name.clone(),
                        port: input.key.clone(),
                    })?;
            }
        }

        tracing::info!(
            "Pipeline built: {} jobs, {} ports, max history depth {} (resolved in {} us)",
            plan.stats.total_jobs,
            plan.stats.total_ports,
            plan.stats.max_history_depth,
            plan.stats.resolve_time_us,
        );

        Ok(Self {
            jobs: slots,
            plan,
            store,
            geometry,
            kpi: KpiCollector::new(),
            next_wave: 0,
            max_waves: None,
            abort: AbortHandle::new(),
            persistence: None,
        })
    }

    // ── Configuration ──

    /// Save selected ports after every wave.
    pub fn with_persistence(mut self, persistence: PortPersistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn set_max_waves(&mut self, max_waves: Option<u64>) {
        self.max_waves = max_waves;
    }

    /// Share an existing abort flag, e.g. one already handed to a job.
    pub fn with_abort_handle(mut self, handle: AbortHandle) -> Self {
        self.abort = handle;
        self
    }

    /// Handle that stops [`run`](Self::run) before its next wave.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    // ── Accessors ──

    pub fn store(&self) -> &PortStore {
        &self.store
    }

    pub fn kpi(&self) -> &KpiCollector {
        &self.kpi
    }

    pub fn plan(&self) -> &CompiledPlan {
        &self.plan
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

    /// Index of the next wave to run.
    pub fn next_wave(&self) -> u64 {
        self.next_wave
    }

    /// Job names in execution order.
    pub fn execution_order(&self) -> Vec<&str> {
        self.plan
            .order
            .iter()
            .map(|&idx| self.jobs[idx].desc.name())
            .collect()
    }

    pub fn job_state(&self, name: &str) -> Option<JobState> {
        self.slot(name).map(|slot| slot.state)
    }

    pub fn job_stats(&self, name: &str) -> Option<JobStats> {
        self.slot(name).map(|slot| slot.stats)
    }

    fn slot(&self, name: &str) -> Option<&JobSlot> {
        self.jobs.iter().find(|slot| slot.desc.name() == name)
    }

    // ── Run loop ──

    /// Run waves until the source is exhausted, `max_waves` is reached or the
    /// abort handle fires. The KPI table is handed to `sink` in every case,
    /// including a fatal error.
    pub fn run<S, K>(&mut self, source: &mut S, sink: &mut K) -> Result<RunSummary, RunError>
    where
        S: FrameSource + ?Sized,
        K: KpiSink + ?Sized,
    {
        let started_at = Utc::now();
        self.kpi.clear();
        tracing::info!(
            "Run started: {} jobs, {} frames available",
            self.jobs.len(),
            source
                .len_hint()
                .map_or_else(|| "unknown".to_string(), |n| n.to_string()),
        );

        let mut waves = 0u64;
        let mut aborted = false;
        let mut fatal = None;

        loop {
            if self.abort.is_aborted() {
                tracing::info!("Abort requested; stopping after {} waves", waves);
                aborted = true;
                break;
            }
            if self.max_waves.is_some_and(|max| waves >= max) {
                tracing::info!("Reached max_waves ({})", waves);
                break;
            }
            let Some(frame) = source.next_frame() else {
                break;
            };
            waves += 1;
            if let Err(err) = self.run_wave(&frame) {
                tracing::error!("Run stopped: {}", err);
                fatal = Some(err);
                break;
            }
        }

        let table = self.kpi.table();
        let exported = sink.write_table(&table);
        if let Some(err) = fatal {
            if let Err(export_err) = exported {
                tracing::error!("KPI export failed after fatal error: {}", export_err);
            }
            return Err(err);
        }
        exported?;

        let summary = RunSummary {
            waves,
            aborted,
            started_at,
            finished_at: Utc::now(),
            jobs: self
                .plan
                .order
                .iter()
                .map(|&idx| {
                    let slot = &self.jobs[idx];
                    JobSummary {
                        name: slot.desc.name().to_string(),
                        state: slot.state,
                        stats: slot.stats,
                    }
                })
                .collect(),
        };
        tracing::info!(
            "Run finished: {} waves, {} job failures{}",
            summary.waves,
            summary.total_failures(),
            if aborted { " (aborted)" } else { "" }
        );
        Ok(summary)
    }

    /// Execute one wave on `frame`.
    ///
    /// Only an unregistered-port lookup is returned as an error; every other
    /// job failure is logged and isolated.
    pub fn run_wave(&mut self, frame: &Frame) -> Result<(), RunError> {
        let wave = self.next_wave;
        self.next_wave += 1;
        self.store.begin_wave(wave);
        self.kpi.begin_wave(wave);
        self.initialize_pending();

        for pos in 0..self.plan.order.len() {
            let idx = self.plan.order[pos];
            if self.jobs[idx].state != JobState::Active {
                continue;
            }

            let started = Instant::now();
            let outcome = self.execute_job(idx, frame, wave);
            let elapsed = started.elapsed();

            let slot = &mut self.jobs[idx];
            self.kpi.record(wave, slot.desc.name(), elapsed);

            match outcome {
                Ok(()) => slot.stats.runs += 1,
                Err(JobError::Port(PortError::NotFound(port))) => {
                    slot.stats.failures += 1;
                    return Err(RunError::PortNotFound {
                        job: slot.desc.name().to_string(),
                        port,
                        wave,
                    });
                }
                Err(err) if is_skip(&err) => {
                    slot.stats.skips += 1;
                    tracing::debug!(job = slot.desc.name(), wave, "Job skipped: {}", err);
                }
                Err(err) => {
                    slot.stats.failures += 1;
                    tracing::error!(job = slot.desc.name(), wave, "Job failed: {}", err);
                }
            }
        }

        if let Some(persistence) = &self.persistence {
            let names: Vec<&str> = self.jobs.iter().map(|slot| slot.desc.name()).collect();
            persistence.save_wave(&self.store, &names, &frame.name, wave);
        }
        Ok(())
    }

    /// Run init once for every job that has not been initialized.
    fn initialize_pending(&mut self) {
        for &idx in &self.plan.order {
            let slot = &mut self.jobs[idx];
            if slot.state != JobState::Unregistered {
                continue;
            }
            slot.state = JobState::Initializing;

            let body = &mut slot.desc.body;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| body.init()));
            slot.state = match outcome {
                Ok(InitState::Init) => JobState::Active,
                Ok(InitState::NotInit) => {
                    tracing::warn!(
                        "Job '{}' reported NOT_INIT; skipped for this run",
                        slot.desc.name()
                    );
                    JobState::PermanentlySkipped
                }
                Err(payload) => {
                    tracing::error!(
                        "Job '{}' panicked during init: {}; skipped for this run",
                        slot.desc.name(),
                        panic_message(payload.as_ref())
                    );
                    JobState::PermanentlySkipped
                }
            };
        }
    }

    /// Check the job's outputs out of the store, call main, and check them back in.
    fn execute_job(&mut self, idx: usize, frame: &Frame, wave: u64) -> Result<(), JobError> {
        let slot = &mut self.jobs[idx];
        let mut outputs: Vec<OutputPort> = slot
            .outputs
            .iter()
            .map(|&id| self.store.checkout(id))
            .collect();

        let result = {
            let mut ctx = JobContext::new(
                &self.store,
                &mut outputs,
                &slot.desc.inputs,
                frame,
                wave,
                &slot.desc.name,
            );
            let body = &mut slot.desc.body;
            match panic::catch_unwind(AssertUnwindSafe(|| body.run(&mut ctx))) {
                Ok(result) => result,
                Err(payload) => Err(JobError::Panicked(panic_message(payload.as_ref()))),
            }
        };

        if result.is_err() {
            for port in &mut outputs {
                port.invalidate();
            }
        }
        for (&id, port) in slot.outputs.iter().zip(outputs) {
            self.store.checkin(id, port);
        }
        result
    }

    // ── Manifest ──

    pub fn manifest(&self) -> JobManifest {
        let jobs = self
            .plan
            .order
            .iter()
            .enumerate()
            .map(|(order, &idx)| {
                let desc = &self.jobs[idx].desc;
                ManifestJob {
                    order,
                    registered: idx,
                    name: desc.name().to_string(),
                    action: desc.action().to_string(),
                    level: desc.level(),
                    inputs: desc.inputs().to_vec(),
                    outputs: desc
                        .outputs()
                        .iter()
                        .map(|spec| ManifestPort {
                            key: spec.key.clone(),
                            shape: self.store.shape(&spec.key).unwrap_or_default().to_vec(),
                            dtype: spec.dtype,
                            color: spec.color,
                            history_depth: self.store.depth(&spec.key).unwrap_or(1),
                        })
                        .collect(),
                    params: desc.params().clone(),
                }
            })
            .collect();

        JobManifest {
            generated_at: Utc::now(),
            geometry: self.geometry.clone(),
            jobs,
        }
    }

    pub fn write_manifest(&self, path: impl AsRef<Path>) -> crate::error::Result<()> {
        let path = path.as_ref();
        self.manifest().save(path)?;
        tracing::info!("Manifest written to {}", path.display());
        Ok(())
    }
}

/// Expected while history fills up or after an upstream failure.
fn is_skip(err: &JobError) -> bool {
    err.is_history_unavailable() || matches!(err, JobError::InvalidInput(_))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
