use crate::{config::Config, util::hash_file};
use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

/// One input row. Never modified after loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRecord {
    pub index: usize,
    pub fields: Vec<String>,
}

impl ReportRecord {
    /// `None` when the row is too short to carry the report column.
    pub fn report_text(&self, column: usize) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct Dataset {
    pub header: Vec<String>,
    pub records: Vec<ReportRecord>,
    pub report_column: usize,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetInfo {
    pub path: String,
    pub total_rows: usize,
    pub columns: usize,
    pub report_column: usize,
    pub report_column_name: String,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ReportRecord> {
        self.records.get(index)
    }

    pub fn info(&self, path: &Path) -> DatasetInfo {
        DatasetInfo {
            path: path.display().to_string(),
            total_rows: self.len(),
            columns: self.header.len(),
            report_column: self.report_column,
            report_column_name: self
                .header
                .get(self.report_column)
                .cloned()
                .unwrap_or_default(),
        }
    }
}

pub fn load_dataset(cfg: &Config) -> Result<Dataset> {
    let path = Path::new(&cfg.paths.input_csv);
    if !path.exists() {
        bail!("input CSV does not exist: {}", path.display());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening input CSV: {}", path.display()))?;

    let header: Vec<String> = reader
        .headers()
        .with_context(|| format!("reading CSV header: {}", path.display()))?
        .iter()
        .map(str::to_string)
        .collect();

    let report_column = resolve_report_column(cfg, &header)?;

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("reading CSV row {}", index))?;
        records.push(ReportRecord {
            index,
            fields: row.iter().map(str::to_string).collect(),
        });
    }

    let fingerprint = hash_file(path)
        .with_context(|| format!("hashing input: {}", path.display()))?;

    info!(
        "read {} data rows from {} (report column {} {:?})",
        records.len(),
        path.display(),
        report_column,
        header.get(report_column).map(String::as_str).unwrap_or("")
    );
    debug!(fingerprint = %fingerprint, "input fingerprint");

    Ok(Dataset {
        header,
        records,
        report_column,
        fingerprint,
    })
}

pub fn resolve_report_column(cfg: &Config, header: &[String]) -> Result<usize> {
    let name = cfg.input.report_column_name.trim();
    if !name.is_empty() {
        return header
            .iter()
            .position(|h| h.trim() == name)
            .with_context(|| format!("report column {:?} not found in CSV header", name));
    }

    let index = cfg.input.report_column_index;
    if index >= header.len() {
        bail!(
            "input.report_column_index {} is out of range for a {}-column header",
            index,
            header.len()
        );
    }
    Ok(index)
}
