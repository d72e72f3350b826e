use crate::{
    batch_plan::BatchPlan,
    checkpoint::{CheckpointState, CheckpointStore, LoadStatus},
    classifier::{ClassificationResult, Classifier, Verdict},
    config::{Config, RunMode},
    engine::InferenceService,
    input::{self, Dataset, ReportRecord},
    report::{Progress, RunSummary},
    writer::ResultWriter,
};
use anyhow::{Context, Result, anyhow, bail};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    Loading,
    Processing,
    Finalizing,
    Done,
    Failed,
}

/// Cooperative stop request, honored between rows only.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub plan: BatchPlan,
    pub summary: RunSummary,
    /// Production only: the state as last saved.
    pub checkpoint: Option<CheckpointState>,
    /// `None` when there was nothing to process and no artifact was opened.
    pub output: Option<PathBuf>,
}

pub struct Pipeline<E: InferenceService, S: CheckpointStore> {
    cfg: Config,
    classifier: Classifier<E>,
    checkpoints: S,
    interrupt: Interrupt,
    state: RunState,
}

impl<E: InferenceService, S: CheckpointStore> Pipeline<E, S> {
    pub fn new(cfg: &Config, classifier: Classifier<E>, checkpoints: S, interrupt: Interrupt) -> Self {
        Self {
            cfg: cfg.clone(),
            classifier,
            checkpoints,
            interrupt,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn checkpoints(&self) -> &S {
        &self.checkpoints
    }

    pub fn classifier(&self) -> &Classifier<E> {
        &self.classifier
    }

    pub fn run(&mut self) -> Result<RunOutcome> {
        if self.state != RunState::Idle {
            return Err(anyhow!("pipeline already ran (state {:?})", self.state));
        }
        match self.execute() {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.transition(RunState::Failed);
                error!("run failed: {err:#}");
                Err(err)
            }
        }
    }

    fn transition(&mut self, next: RunState) {
        debug!("state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn execute(&mut self) -> Result<RunOutcome> {
        let started = Instant::now();
        self.transition(RunState::Loading);

        if self.cfg.run.preflight_check {
            self.preflight()?;
        }

        let dataset = input::load_dataset(&self.cfg).with_context(|| "loading input")?;
        let mut checkpoint = match self.cfg.run.mode {
            RunMode::Production => Some(self.resume_state(&dataset)),
            RunMode::Test => None,
        };
        let plan = BatchPlan::compute(&self.cfg, dataset.len(), checkpoint.as_ref());
        info!(
            "plan mode={} rows={} start={} end={:?} ordering={:?} total={}",
            plan.mode.as_str(),
            plan.len(),
            plan.start_index,
            plan.end_index,
            plan.ordering,
            plan.total_rows
        );

        self.transition(RunState::Processing);

        if plan.is_empty() {
            info!("all {} rows already processed, nothing to do", dataset.len());
            let mut summary = RunSummary::new(
                &plan,
                self.classifier.model(),
                self.cfg.production_output_path().display().to_string(),
            );
            summary.finish(started.elapsed().as_secs_f64());
            return Ok(self.finalize(plan, summary, checkpoint, None, &dataset));
        }

        let mut writer = match self.cfg.run.mode {
            RunMode::Production => {
                ResultWriter::open_append(&self.cfg.production_output_path(), &dataset.header)?
            }
            RunMode::Test => ResultWriter::create_unique(
                &self.cfg.output_dir(),
                &self.cfg.paths.test_output_prefix,
                &dataset.header,
            )?,
        };

        let mut summary = RunSummary::new(
            &plan,
            self.classifier.model(),
            writer.path().display().to_string(),
        );

        for (pos, &index) in plan.indices.iter().enumerate() {
            if self.interrupt.is_requested() {
                warn!(
                    "interrupt received; stopping before row {} ({} of {} done)",
                    index,
                    pos,
                    plan.len()
                );
                summary.interrupted = true;
                break;
            }

            let record = dataset
                .get(index)
                .with_context(|| format!("planned row {} is outside the input", index))?;
            // classify, append, then checkpoint
            let result = self.classify_record(&dataset, record);

            writer.append(record, &result)?;

            if let Some(state) = checkpoint.as_mut() {
                self.commit(state, index)?;
            }

            summary.counts.record(result.verdict);
            info!(
                "[{}/{}] row {} -> {}",
                pos + 1,
                plan.len(),
                index,
                result.verdict.label()
            );
            if result.verdict == Verdict::Error {
                warn!("row {}: {}", index, result.reasoning);
            }
        }

        let output = writer.path().to_path_buf();
        summary.finish(started.elapsed().as_secs_f64());
        Ok(self.finalize(plan, summary, checkpoint, Some(output), &dataset))
    }

    fn finalize(
        &mut self,
        plan: BatchPlan,
        mut summary: RunSummary,
        checkpoint: Option<CheckpointState>,
        output: Option<PathBuf>,
        dataset: &Dataset,
    ) -> RunOutcome {
        self.transition(RunState::Finalizing);
        if let Some(state) = &checkpoint {
            summary.progress = Some(Progress::new(state.committed_rows(), dataset.len()));
        }
        summary.log();
        self.transition(RunState::Done);
        RunOutcome {
            plan,
            summary,
            checkpoint,
            output,
        }
    }

    fn preflight(&self) -> Result<()> {
        let model = self.classifier.model();
        let diag = self.classifier.engine().diagnose(model);
        if !diag.reachable {
            bail!(
                "inference service at {} is not reachable: {}",
                diag.base_url,
                diag.error.unwrap_or_default()
            );
        }
        if !diag.model_available {
            bail!("model {:?} is not available at {}", model, diag.base_url);
        }
        info!("inference service ok at {} with model {}", diag.base_url, model);
        Ok(())
    }

    fn resume_state(&self, dataset: &Dataset) -> CheckpointState {
        let output = self.cfg.production_output_path();
        let loaded = self.checkpoints.load(&output);
        let mut state = loaded.state;

        match &loaded.status {
            LoadStatus::Missing => info!("no checkpoint, starting from row 0"),
            LoadStatus::Corrupt(_) => {
                if output.exists() {
                    warn!(
                        "output {} already exists; rows may be written again",
                        output.display()
                    );
                }
            }
            LoadStatus::Loaded => {
                info!(
                    "resuming after row {} ({} of {} committed)",
                    state.last_completed_index,
                    state.committed_rows(),
                    dataset.len()
                );
                if state.total_row_count != dataset.len() {
                    warn!(
                        "input row count changed since checkpoint: {} -> {}",
                        state.total_row_count,
                        dataset.len()
                    );
                }
                if let Some(prev) = &state.input_sha256 {
                    if *prev != dataset.fingerprint {
                        warn!("input file content changed since checkpoint was written");
                    }
                }
                if state.output_file != output.display().to_string() {
                    warn!(
                        "checkpoint refers to output {}, continuing with {}",
                        state.output_file,
                        output.display()
                    );
                }
            }
        }

        state.total_row_count = dataset.len();
        state.input_sha256 = Some(dataset.fingerprint.clone());
        state.output_file = output.display().to_string();
        state
    }

    fn classify_record(&self, dataset: &Dataset, record: &ReportRecord) -> ClassificationResult {
        match record.report_text(dataset.report_column) {
            Some(text) => self.classifier.classify(text),
            None => ClassificationResult::error("Missing report text column"),
        }
    }

    /// Saves `index` as the last completed row. Only ever moves forward.
    fn commit(&mut self, state: &mut CheckpointState, index: usize) -> Result<()> {
        if (index as i64) < state.last_completed_index {
            bail!(
                "refusing to move checkpoint backwards: {} -> {}",
                state.last_completed_index,
                index
            );
        }
        let next = state.advanced_to(index);
        self.checkpoints
            .save(&next)
            .with_context(|| format!("saving checkpoint at row {}", index))?;
        *state = next;
        Ok(())
    }
}
