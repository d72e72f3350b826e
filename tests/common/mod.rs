#![allow(dead_code)]

use addendum_triage::config::{Config, RunMode};
use addendum_triage::engine::{ChatReply, ChatRequest, InferenceService, ServiceDiag, ServiceError};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Inference service driven by a closure over `(report_text, call_number)`.
pub struct ScriptedService<F> {
    respond: F,
    calls: RefCell<Vec<(String, Duration)>>,
    pub reachable: bool,
    pub model_available: bool,
}

impl<F> ScriptedService<F>
where
    F: Fn(&str, usize) -> Result<ChatReply, ServiceError>,
{
    pub fn new(respond: F) -> Self {
        Self {
            respond,
            calls: RefCell::new(Vec::new()),
            reachable: true,
            model_available: true,
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn texts(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn timeouts(&self) -> Vec<Duration> {
        self.calls.borrow().iter().map(|(_, d)| *d).collect()
    }
}

impl<F> InferenceService for ScriptedService<F>
where
    F: Fn(&str, usize) -> Result<ChatReply, ServiceError>,
{
    fn diagnose(&self, model: &str) -> ServiceDiag {
        ServiceDiag {
            base_url: "http://scripted".to_string(),
            model: model.to_string(),
            reachable: self.reachable,
            model_available: self.model_available,
            models: Vec::new(),
            error: (!self.reachable).then(|| "connection refused".to_string()),
        }
    }

    fn chat(&self, req: &ChatRequest, timeout: Duration) -> Result<ChatReply, ServiceError> {
        let n = self.calls.borrow().len();
        self.calls
            .borrow_mut()
            .push((req.report_text.clone(), timeout));
        (self.respond)(&req.report_text, n)
    }
}

pub fn answer(imaging: bool, addendum: Option<&str>) -> ChatReply {
    let content = serde_json::json!({
        "is_imaging_related": imaging,
        "addendum_content": addendum,
    });
    ChatReply {
        content: content.to_string(),
        thinking: "checked the addendum".to_string(),
    }
}

pub fn timeout() -> ServiceError {
    ServiceError::Timeout(Duration::from_secs(1))
}

/// Writes `id,report` rows to `<dir>/reports.csv`.
pub fn write_reports(dir: &Path, reports: &[&str]) -> PathBuf {
    let path = dir.join("reports.csv");
    let mut w = csv::Writer::from_path(&path).expect("create input csv");
    w.write_record(["id", "report"]).expect("header");
    for (i, r) in reports.iter().enumerate() {
        w.write_record([format!("r{i}"), r.to_string()])
            .expect("row");
    }
    w.flush().expect("flush");
    path
}

/// Production config rooted in `dir`, with no network preflight and no
/// pauses between attempts.
pub fn config_for(dir: &Path, input: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.run.mode = RunMode::Production;
    cfg.run.preflight_check = false;
    cfg.paths.input_csv = input.display().to_string();
    cfg.paths.output_dir = dir.join("out").display().to_string();
    cfg.input.report_column_index = 1;
    cfg.retry.initial_backoff_ms = 0;
    cfg.retry.max_backoff_ms = 0;
    cfg.logging.write_to_file = false;
    cfg
}

pub fn read_output(path: &Path) -> Vec<Vec<String>> {
    let mut r = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .expect("open output");
    r.records()
        .map(|rec| rec.expect("record").iter().map(str::to_string).collect())
        .collect()
}
