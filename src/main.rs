//! wavepipe-rs - command line entry point
//!
//! Runs the frame-acquisition + delay-line demo pipeline over a folder of
//! images and writes the KPI log, manifest and optionally saved ports.
//!
//! ```text
//! wavepipe-rs [run.toml|run.json]
//! wavepipe-rs --init run.toml
//! ```

use anyhow::Context;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wavepipe_rs::{
    pipeline::{CopyPortConfig, CsvKpiSink, GetFrameConfig, PipelineBuilder},
    source::{ColorMode, FolderSource},
    RunConfig,
};

/// Log file written into the output folder
const LOG_FILE: &str = "wavepipe.log";

/// Its appearance in the output folder aborts a running pipeline
const STOP_FILE: &str = "STOP";
const STOP_FILE_POLL: Duration = Duration::from_millis(200);

fn init_logging(output_folder: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::never(output_folder, LOG_FILE);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,wavepipe_rs=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    guard
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if let [flag, path] = args.as_slice() {
        if flag == "--init" {
            RunConfig::default()
                .save(path)
                .with_context(|| format!("Failed to create config file {}", path))?;
            println!("Default run config written to {}", path);
            return Ok(());
        }
    }

    let mut config = match args.first() {
        Some(path) => RunConfig::load(path).with_context(|| format!("Invalid run config {}", path))?,
        None => RunConfig::default(),
    };

    std::fs::create_dir_all(&config.output_folder).with_context(|| {
        format!(
            "Failed to create output folder {}",
            config.output_folder.display()
        )
    })?;
    let _log_guard = init_logging(&config.output_folder);

    tracing::info!("Starting wavepipe-rs on {}", config.input_folder.display());

    let mut source = FolderSource::open(&config.input_folder, config.color_mode)?;
    if let Some((width, height)) = source.first_image_dimensions() {
        let (width, height) = (width as usize, height as usize);
        if (width, height) != (config.frame.width, config.frame.height) {
            tracing::warn!(
                "Configured frame size {}x{} differs from input {}x{}; using the input size",
                config.frame.width,
                config.frame.height,
                width,
                height
            );
            config.frame.width = width;
            config.frame.height = height;
        }
    }

    let mut builder = PipelineBuilder::from_config(&config);
    let raw = builder.get_frame_job(&GetFrameConfig {
        color: config.color_mode == ColorMode::Rgb,
        ..GetFrameConfig::default()
    })?;
    let delayed = builder.copy_port_job(&CopyPortConfig::new(
        raw.name.clone(),
        raw.level,
        config.delay_waves,
    ))?;
    tracing::debug!("Demo pipeline: {} -> {}", raw, delayed);

    let mut pipeline = builder.build()?;
    pipeline.set_max_waves(config.max_waves);
    if let Some(persistence) = config.persistence() {
        pipeline = pipeline.with_persistence(persistence);
    }
    if config.write_manifest {
        pipeline.write_manifest(config.manifest_path())?;
    }

    // Creating this file stops the run after the current wave.
    let stop_file = config.output_folder.join(STOP_FILE);
    if stop_file.exists() {
        std::fs::remove_file(&stop_file)
            .with_context(|| format!("Failed to remove stale {}", stop_file.display()))?;
    }
    let _stop_watcher = pipeline
        .abort_handle()
        .watch_stop_file(&stop_file, STOP_FILE_POLL);

    let mut sink = CsvKpiSink::new(config.kpi_log_path());
    let summary = pipeline.run(&mut source, &mut sink)?;
    if summary.aborted {
        tracing::info!("Run aborted through {}", stop_file.display());
    }

    for job in &summary.jobs {
        tracing::info!(
            "{}: {:?}, {} runs, {} skips, {} failures",
            job.name,
            job.state,
            job.stats.runs,
            job.stats.skips,
            job.stats.failures
        );
    }
    tracing::info!(
        "Done: {} waves, KPI log at {}",
        summary.waves,
        config.kpi_log_path().display()
    );

    Ok(())
}
