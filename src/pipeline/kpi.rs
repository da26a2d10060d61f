//! Per-job timing collection and CSV export.
//!
//! The executor marks every wave it starts and records one [`KpiRecord`] per
//! executed job per wave. At the end of a run the records are pivoted into a
//! [`KpiTable`] (one row per wave, one column per job) and handed to a
//! [`KpiSink`].
//!
//! CSV layout:
//!
//! ```text
//! Frame,Get frame RAW L0 Avg Time[ms],COPY RAW_L0 W1 L0 Avg Time[ms],False
//! 0,0.412,0.038,False
//! 1,0.397,0.041,False
//! ```
//!
//! Every line ends with the `False` marker and every table starts with its
//! `Frame` header, so several runs can be appended to one log and split apart
//! again by [`KpiTable::parse_log`].

use crate::error::{Result, WavepipeError};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Header of the wave-index column.
pub const KPI_WAVE_HEADER: &str = "Frame";
/// Suffix appended to every job column header.
pub const KPI_COLUMN_SUFFIX: &str = " Avg Time[ms]";
/// Last field of every header and data line.
pub const KPI_LINE_MARKER: &str = "False";

/// Wall-clock duration of one job on one wave.
#[derive(Debug, Clone, PartialEq)]
pub struct KpiRecord {
    pub wave: u64,
    pub job: String,
    pub elapsed: Duration,
}

impl KpiRecord {
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_nanos() as f64 / 1_000_000.0
    }
}

/// Accumulates timing records for a run.
#[derive(Debug, Default)]
pub struct KpiCollector {
    waves: BTreeSet<u64>,
    records: Vec<KpiRecord>,
}

impl KpiCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `wave` as started so it gets a row even if no job runs.
    pub fn begin_wave(&mut self, wave: u64) {
        self.waves.insert(wave);
    }

    pub fn record(&mut self, wave: u64, job: &str, elapsed: Duration) {
        self.waves.insert(wave);
        self.records.push(KpiRecord {
            wave,
            job: job.to_string(),
            elapsed,
        });
    }

    pub fn records(&self) -> &[KpiRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Waves started since the last [`clear`](Self::clear).
    pub fn wave_count(&self) -> usize {
        self.waves.len()
    }

    pub fn clear(&mut self) {
        self.waves.clear();
        self.records.clear();
    }

    /// Mean duration of `job` over all recorded waves.
    pub fn mean_ms(&self, job: &str) -> Option<f64> {
        let (sum, count) = self
            .records
            .iter()
            .filter(|r| r.job == job)
            .fold((0.0, 0usize), |(sum, count), r| (sum + r.elapsed_ms(), count + 1));
        (count > 0).then(|| sum / count as f64)
    }

    /// Pivot records into one row per started wave. Columns follow the order
    /// in which jobs first reported, so jobs that never ran get no column.
    pub fn table(&self) -> KpiTable {
        let mut columns: Vec<String> = Vec::new();
        let mut column_of: HashMap<&str, usize> = HashMap::new();
        for record in &self.records {
            if !column_of.contains_key(record.job.as_str()) {
                column_of.insert(record.job.as_str(), columns.len());
                columns.push(record.job.clone());
            }
        }

        let mut rows: BTreeMap<u64, Vec<Option<f64>>> = self
            .waves
            .iter()
            .map(|&wave| (wave, vec![None; columns.len()]))
            .collect();
        for record in &self.records {
            let row = rows
                .entry(record.wave)
                .or_insert_with(|| vec![None; columns.len()]);
            let cell = &mut row[column_of[record.job.as_str()]];
            // A job runs at most once per wave; keep the sum if it ever doesn't.
            *cell = Some(cell.unwrap_or(0.0) + record.elapsed_ms());
        }

        KpiTable {
            columns,
            rows: rows
                .into_iter()
                .map(|(wave, values)| KpiRow { wave, values })
                .collect(),
        }
    }
}

/// One wave of timings.
#[derive(Debug, Clone, PartialEq)]
pub struct KpiRow {
    pub wave: u64,
    /// Milliseconds per column, `None` when the job did not run that wave.
    pub values: Vec<Option<f64>>,
}

/// Wave × job timing table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KpiTable {
    /// Job names, one per timing column.
    pub columns: Vec<String>,
    pub rows: Vec<KpiRow>,
}

impl KpiTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_header(job: &str) -> String {
        format!("{}{}", job, KPI_COLUMN_SUFFIX)
    }

    pub fn column_index(&self, job: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == job)
    }

    /// Render as one CSV block. Header and rows all end with the marker field.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        out.push_str(KPI_WAVE_HEADER);
        for job in &self.columns {
            out.push(',');
            out.push_str(&csv_field(&Self::column_header(job)));
        }
        out.push(',');
        out.push_str(KPI_LINE_MARKER);
        out.push('\n');

        for row in &self.rows {
            out.push_str(&row.wave.to_string());
            for value in &row.values {
                out.push(',');
                if let Some(ms) = value {
                    out.push_str(&format!("{:.3}", ms));
                }
            }
            out.push(',');
            out.push_str(KPI_LINE_MARKER);
            out.push('\n');
        }
        out
    }

    /// Read back every table of a KPI log, in file order.
    pub fn parse_log(log: &str) -> Result<Vec<KpiTable>> {
        let mut tables: Vec<KpiTable> = Vec::new();
        for (idx, line) in log.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let invalid = |message: &str| {
                WavepipeError::Serialization(format!("KPI log line {}: {}", idx + 1, message))
            };

            let mut fields = split_csv_line(line);
            if fields.last().map(String::as_str) != Some(KPI_LINE_MARKER) {
                return Err(invalid("missing end-of-line marker"));
            }
            fields.pop();

            if fields.first().map(String::as_str) == Some(KPI_WAVE_HEADER) {
                let columns = fields[1..]
                    .iter()
                    .map(|header| {
                        header
                            .strip_suffix(KPI_COLUMN_SUFFIX)
                            .map(str::to_string)
                            .ok_or_else(|| invalid("column header without timing suffix"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                tables.push(KpiTable {
                    columns,
                    rows: Vec::new(),
                });
                continue;
            }

            let table = tables
                .last_mut()
                .ok_or_else(|| invalid("row before any header"))?;
            if fields.len() != table.columns.len() + 1 {
                return Err(invalid("row width differs from header"));
            }
            let wave = fields[0]
                .parse()
                .map_err(|_| invalid("wave index is not an integer"))?;
            let values = fields[1..]
                .iter()
                .map(|cell| {
                    if cell.is_empty() {
                        Ok(None)
                    } else {
                        cell.parse()
                            .map(Some)
                            .map_err(|_| invalid("timing is not a number"))
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            table.rows.push(KpiRow { wave, values });
        }
        Ok(tables)
    }
}

/// Quote a field that contains a separator, quote or newline.
fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split one CSV line, honoring quoted fields and doubled quotes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            c => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// Destination of a finished KPI table.
#[cfg_attr(test, mockall::automock)]
pub trait KpiSink {
    fn write_table(&mut self, table: &KpiTable) -> io::Result<()>;
}

/// Appends tables to a CSV log file, creating it and its directory as needed.
#[derive(Debug, Clone)]
pub struct CsvKpiSink {
    path: PathBuf,
}

impl CsvKpiSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KpiSink for CsvKpiSink {
    fn write_table(&mut self, table: &KpiTable) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(table.to_csv().as_bytes())?;
        file.flush()?;
        tracing::info!(
            path = %self.path.display(),
            rows = table.rows.len(),
            columns = table.columns.len(),
            "KPI table written"
        );
        Ok(())
    }
}

/// Keeps tables in memory.
#[derive(Debug, Default)]
pub struct MemoryKpiSink {
    pub tables: Vec<KpiTable>,
}

impl MemoryKpiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&KpiTable> {
        self.tables.last()
    }
}

impl KpiSink for MemoryKpiSink {
    fn write_table(&mut self, table: &KpiTable) -> io::Result<()> {
        self.tables.push(table.clone());
        Ok(())
    }
}
