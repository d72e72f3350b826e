use crate::{
    classifier::ClassificationResult,
    input::ReportRecord,
    util::{ensure_dir, ensure_parent_dir, timestamp_slug},
};
use anyhow::{Context, Result, bail};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::info;

pub const VERDICT_COLUMN: &str = "Imaging Related Addendum";
pub const CONTENT_COLUMN: &str = "Imaging Addendum Content";
pub const REASONING_COLUMN: &str = "Model Reasoning";

/// Input header followed by the three derived columns.
pub fn output_header(input_header: &[String]) -> Vec<String> {
    let mut header = input_header.to_vec();
    header.push(VERDICT_COLUMN.to_string());
    header.push(CONTENT_COLUMN.to_string());
    header.push(REASONING_COLUMN.to_string());
    header
}

/// Input fields fitted to `width` columns, then the three derived columns.
/// Short rows are padded with empty cells; fields past the header are joined
/// into the last input column.
pub fn output_row(record: &ReportRecord, result: &ClassificationResult, width: usize) -> Vec<String> {
    let mut row = record.fields.clone();
    if width > 0 && row.len() > width {
        let overflow = row.split_off(width - 1).join(",");
        row.push(overflow);
    }
    row.resize(width.max(row.len()), String::new());
    row.push(result.verdict.label().to_string());
    row.push(result.addendum.clone().unwrap_or_default());
    row.push(result.reasoning.clone());
    row
}

/// Appends one processed row at a time. Each append is flushed and synced
/// before returning, so a caller may treat a returned `Ok` as durable.
pub struct ResultWriter {
    path: PathBuf,
    writer: csv::Writer<File>,
    width: usize,
    rows_written: usize,
}

impl ResultWriter {
    /// Opens the production artifact for appending, creating it (with a
    /// header) only if it does not exist yet or is empty.
    pub fn open_append(path: &Path, input_header: &[String]) -> Result<Self> {
        ensure_parent_dir(path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening output for append: {}", path.display()))?;
        let is_new = file
            .metadata()
            .with_context(|| format!("stat output: {}", path.display()))?
            .len()
            == 0;

        let mut out = Self::wrap(path, file, input_header.len());
        if is_new {
            out.write_header(input_header)?;
            info!("created output {}", path.display());
        } else {
            info!("appending to existing output {}", path.display());
        }
        Ok(out)
    }

    /// Creates a brand-new artifact; fails rather than touching an existing file.
    pub fn create_new(path: &Path, input_header: &[String]) -> Result<Self> {
        ensure_parent_dir(path)?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .with_context(|| format!("creating output: {}", path.display()))?;
        let mut out = Self::wrap(path, file, input_header.len());
        out.write_header(input_header)?;
        info!("created output {}", path.display());
        Ok(out)
    }

    /// Creates `<dir>/<prefix>_<timestamp>.csv`, suffixing `_<n>` on collision.
    pub fn create_unique(dir: &Path, prefix: &str, input_header: &[String]) -> Result<Self> {
        ensure_dir(dir)?;
        let stem = format!("{}_{}", prefix, timestamp_slug());
        for n in 0..1000u32 {
            let name = if n == 0 {
                format!("{stem}.csv")
            } else {
                format!("{stem}_{n}.csv")
            };
            let path = dir.join(name);
            if path.exists() {
                continue;
            }
            match Self::create_new(&path, input_header) {
                Ok(w) => return Ok(w),
                Err(e) if path.exists() => {
                    tracing::debug!("lost race for {}: {e:#}", path.display());
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        bail!("could not find a free output name for {} in {}", stem, dir.display())
    }

    fn wrap(path: &Path, file: File, width: usize) -> Self {
        let writer = csv::WriterBuilder::new().flexible(true).from_writer(file);
        Self {
            path: path.to_path_buf(),
            writer,
            width,
            rows_written: 0,
        }
    }

    fn write_header(&mut self, input_header: &[String]) -> Result<()> {
        self.writer
            .write_record(output_header(input_header))
            .with_context(|| format!("writing header: {}", self.path.display()))?;
        self.sync()
    }

    pub fn append(&mut self, record: &ReportRecord, result: &ClassificationResult) -> Result<()> {
        self.writer
            .write_record(output_row(record, result, self.width))
            .with_context(|| {
                format!("writing row {} to {}", record.index, self.path.display())
            })?;
        self.sync()?;
        self.rows_written += 1;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("flushing {}", self.path.display()))?;
        self.writer
            .get_ref()
            .sync_data()
            .with_context(|| format!("syncing {}", self.path.display()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }
}
