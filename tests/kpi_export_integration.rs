//! End-to-end run over an image folder: KPI log, saved ports and manifest.

mod common;

use common::builders::key;
use image::{GrayImage, Luma};
use std::path::Path;
use wavepipe_rs::pipeline::{
    CopyPortConfig, CsvKpiSink, GetFrameConfig, JobManifest, KpiTable, Pipeline,
    PipelineBuilder, PyramidLevel,
};
use wavepipe_rs::source::{ColorMode, FolderSource};
use wavepipe_rs::{FrameSource, RunConfig, SaveSettings};

fn write_frames(dir: &Path, count: u8) {
    std::fs::create_dir_all(dir).unwrap();
    for i in 0..count {
        let img = GrayImage::from_pixel(8, 4, Luma([10 * i + 5]));
        img.save(dir.join(format!("frame_{:03}.png", i))).unwrap();
    }
    std::fs::write(dir.join("notes.txt"), "not a frame").unwrap();
}

fn run_config(root: &Path) -> RunConfig {
    let mut config = RunConfig {
        input_folder: root.join("frames"),
        output_folder: root.join("out"),
        color_mode: ColorMode::Gray,
        save: SaveSettings::ports(vec![key("RAW_DELAY_1")]),
        ..RunConfig::default()
    };
    config.frame.width = 8;
    config.frame.height = 4;
    config
}

fn build(config: &RunConfig) -> Pipeline {
    let mut builder = PipelineBuilder::from_config(config);
    let raw = builder
        .get_frame_job(&GetFrameConfig {
            color: false,
            ..GetFrameConfig::default()
        })
        .unwrap();
    builder
        .copy_port_job(&CopyPortConfig::new(raw.name, raw.level, config.delay_waves))
        .unwrap();
    let mut pipeline = builder.build().unwrap();
    pipeline.set_max_waves(config.max_waves);
    match config.persistence() {
        Some(persistence) => pipeline.with_persistence(persistence),
        None => pipeline,
    }
}

#[test]
fn test_folder_run_appends_kpi_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let config = run_config(dir.path());
    write_frames(&config.input_folder, 4);

    let config_path = dir.path().join("run.toml");
    config.save(&config_path).unwrap();
    let config = RunConfig::load(&config_path).unwrap();

    let mut pipeline = build(&config);
    pipeline.write_manifest(config.manifest_path()).unwrap();

    let mut source = FolderSource::open(&config.input_folder, config.color_mode).unwrap();
    assert_eq!(source.len_hint(), Some(4));
    assert_eq!(source.first_image_dimensions(), Some((8, 4)));

    let mut sink = CsvKpiSink::new(config.kpi_log_path());
    let first = pipeline.run(&mut source, &mut sink).unwrap();
    assert_eq!(first.waves, 4);
    assert_eq!(first.total_failures(), 0);

    let saved_dir = config
        .output_folder
        .join("ports")
        .join("RAW_DELAY_1_L0");
    let mut saved: Vec<String> = std::fs::read_dir(&saved_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    saved.sort();
    // Wave 0 has no history yet.
    assert_eq!(saved, vec!["frame_001.png", "frame_002.png", "frame_003.png"]);
    let delayed = image::open(saved_dir.join("frame_002.png")).unwrap().to_luma8();
    assert_eq!(delayed.get_pixel(0, 0).0, [15]);
    assert!(!config.output_folder.join("ports").join("RAW_L0").exists());

    source.reset();
    let second = pipeline.run(&mut source, &mut sink).unwrap();
    assert_eq!(second.waves, 4);
    let copy = second.job("COPY RAW_L0 W1 L0").unwrap();
    assert_eq!(copy.stats.skips, 0);
    assert_eq!(copy.stats.runs, 4);

    let log = std::fs::read_to_string(config.kpi_log_path()).unwrap();
    assert_eq!(log.matches("Frame,").count(), 2);
    assert!(log
        .lines()
        .all(|line| line.ends_with(",False")));
    // Readers split each block on the line marker.
    assert!(log.starts_with(
        "Frame,Get frame RAW L0 Avg Time[ms],COPY RAW_L0 W1 L0 Avg Time[ms],False\n0,"
    ));

    let tables = KpiTable::parse_log(&log).unwrap();
    assert_eq!(tables.len(), 2);
    for (block, table) in tables.iter().enumerate() {
        assert_eq!(table.columns, vec!["Get frame RAW L0", "COPY RAW_L0 W1 L0"]);
        assert_eq!(table.rows.len(), 4);
        for (i, row) in table.rows.iter().enumerate() {
            assert_eq!(row.wave, (block * 4 + i) as u64);
            for value in &row.values {
                let ms = value.unwrap();
                assert!(ms >= 0.0);
                common::assert_float_eq(ms, (ms * 1000.0).round() / 1000.0, 1e-9);
            }
        }
    }

    let manifest = JobManifest::load(config.manifest_path()).unwrap();
    assert_eq!(manifest.geometry.width, 8);
    assert_eq!(manifest.jobs.len(), 2);
    let raw = manifest.job("Get frame RAW L0").unwrap();
    assert_eq!(raw.outputs[0].key, key("RAW"));
    assert_eq!(raw.outputs[0].shape, vec![4, 8]);
    assert_eq!(raw.outputs[0].history_depth, 2);
    let copy = manifest.job("COPY RAW_L0 W1 L0").unwrap();
    assert_eq!(copy.order, 1);
    assert_eq!(copy.inputs[0].wave_offset, 1);
    assert_eq!(copy.level, PyramidLevel::L0);
}

#[test]
fn test_max_waves_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = run_config(dir.path());
    config.max_waves = Some(2);
    config.save = SaveSettings::default();
    write_frames(&config.input_folder, 5);

    let mut pipeline = build(&config);
    let mut source = FolderSource::open(&config.input_folder, config.color_mode).unwrap();
    let mut sink = CsvKpiSink::new(config.kpi_log_path());
    let summary = pipeline.run(&mut source, &mut sink).unwrap();

    assert_eq!(summary.waves, 2);
    assert_eq!(source.len_hint(), Some(3));
    assert!(!config.output_folder.join("ports").exists());

    let log = std::fs::read_to_string(config.kpi_log_path()).unwrap();
    let tables = KpiTable::parse_log(&log).unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].rows.len(), 2);
}
