use crate::{
    batch_plan::BatchPlan,
    classifier::Verdict,
    config::RunMode,
    util::percent,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictCounts {
    pub imaging: usize,
    pub not_imaging: usize,
    pub error: usize,
}

impl VerdictCounts {
    pub fn record(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Imaging => self.imaging += 1,
            Verdict::NotImaging => self.not_imaging += 1,
            Verdict::Error => self.error += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.imaging + self.not_imaging + self.error
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub mode: RunMode,
    pub model: String,
    pub output: String,
    pub planned_rows: usize,
    pub processed_rows: usize,
    pub counts: VerdictCounts,
    pub interrupted: bool,
    pub elapsed_secs: f64,
    pub avg_secs_per_report: f64,
    /// Production only: rows committed across all runs, and what remains.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub committed_rows: usize,
    pub total_rows: usize,
    pub remaining_rows: usize,
    pub percent_complete: f64,
}

impl Progress {
    pub fn new(committed_rows: usize, total_rows: usize) -> Self {
        Self {
            committed_rows,
            total_rows,
            remaining_rows: total_rows.saturating_sub(committed_rows),
            percent_complete: percent(committed_rows, total_rows),
        }
    }
}

impl RunSummary {
    pub fn new(plan: &BatchPlan, model: &str, output: String) -> Self {
        Self {
            mode: plan.mode,
            model: model.to_string(),
            output,
            planned_rows: plan.len(),
            processed_rows: 0,
            counts: VerdictCounts::default(),
            interrupted: false,
            elapsed_secs: 0.0,
            avg_secs_per_report: 0.0,
            progress: None,
        }
    }

    pub fn finish(&mut self, elapsed_secs: f64) {
        self.processed_rows = self.counts.total();
        self.elapsed_secs = elapsed_secs;
        self.avg_secs_per_report = if self.processed_rows == 0 {
            0.0
        } else {
            elapsed_secs / self.processed_rows as f64
        };
    }

    pub fn log(&self) {
        let n = self.processed_rows;
        tracing::info!(
            "run complete mode={} processed={}/{} interrupted={}",
            self.mode.as_str(),
            n,
            self.planned_rows,
            self.interrupted
        );
        tracing::info!(
            "imaging={} ({:.1}%) not_imaging={} ({:.1}%) errors={} ({:.1}%)",
            self.counts.imaging,
            percent(self.counts.imaging, n),
            self.counts.not_imaging,
            percent(self.counts.not_imaging, n),
            self.counts.error,
            percent(self.counts.error, n)
        );
        tracing::info!(
            "elapsed={:.1}s avg_per_report={:.1}s output={}",
            self.elapsed_secs,
            self.avg_secs_per_report,
            self.output
        );
        if let Some(p) = &self.progress {
            tracing::info!(
                "progress {}/{} ({:.1}%), {} remaining",
                p.committed_rows,
                p.total_rows,
                p.percent_complete,
                p.remaining_rows
            );
        }
    }
}
