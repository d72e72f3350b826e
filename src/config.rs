use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub run: Run,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub input: Input,
    #[serde(default)]
    pub batch: Batch,
    #[serde(default)]
    pub inference: Inference,
    #[serde(default)]
    pub retry: Retry,
    #[serde(default)]
    pub classification: Classification,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    /// Rejects settings that would make a run meaningless before any row is touched.
    pub fn validate(&self) -> Result<()> {
        if self.paths.input_csv.trim().is_empty() {
            bail!("paths.input_csv must be set");
        }
        if self.paths.output_dir.trim().is_empty() {
            bail!("paths.output_dir must be set");
        }
        if self.paths.production_output_file.trim().is_empty()
            || self.paths.checkpoint_file.trim().is_empty()
        {
            bail!("paths.production_output_file and paths.checkpoint_file must be set");
        }
        if self.inference.model.trim().is_empty() {
            bail!("inference.model must be set");
        }
        if self.inference.base_url.trim().is_empty() {
            bail!("inference.base_url must be set");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if self.retry.timeout_seconds == 0 || self.retry.retry_timeout_seconds == 0 {
            bail!("retry timeouts must be greater than zero");
        }
        if self.retry.backoff_multiplier < 1.0 {
            bail!(
                "retry.backoff_multiplier must be >= 1.0 (got {})",
                self.retry.backoff_multiplier
            );
        }
        if self.run.mode == RunMode::Test && self.batch.sample_size == 0 {
            bail!("batch.sample_size must be at least 1 in test mode");
        }
        if self.classification.prefilter_markers {
            Regex::new(&self.classification.marker_pattern).map_err(|e| {
                anyhow!(
                    "invalid classification.marker_pattern {:?}: {e}",
                    self.classification.marker_pattern
                )
            })?;
        }
        Ok(())
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.paths.output_dir)
    }

    pub fn production_output_path(&self) -> PathBuf {
        self.output_dir().join(&self.paths.production_output_file)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.output_dir().join(&self.paths.checkpoint_file)
    }

    /// `None` means the rest of the input is one batch.
    pub fn batch_size(&self) -> Option<usize> {
        match self.batch.batch_size {
            0 => None,
            n => Some(n),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            run: Default::default(),
            paths: Default::default(),
            input: Default::default(),
            batch: Default::default(),
            inference: Default::default(),
            retry: Default::default(),
            classification: Default::default(),
            logging: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Sample rows into a fresh, timestamped output file; checkpoint untouched.
    Test,
    /// Sequential batches appended to one output file, resumable via checkpoint.
    Production,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Test => "test",
            RunMode::Production => "production",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Run {
    pub mode: RunMode,
    pub print_summary: bool,
    pub preflight_check: bool,
}
impl Default for Run {
    fn default() -> Self {
        Self {
            mode: RunMode::Production,
            print_summary: true,
            preflight_check: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub input_csv: String,
    pub output_dir: String,
    pub production_output_file: String,
    pub checkpoint_file: String,
    pub test_output_prefix: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            input_csv: "data/reports.csv".into(),
            output_dir: "data/output".into(),
            production_output_file: "processed_reports_final.csv".into(),
            checkpoint_file: "checkpoint.json".into(),
            test_output_prefix: "processed_reports_test".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Input {
    /// Header name of the report column; wins over the index when non-empty.
    pub report_column_name: String,
    pub report_column_index: usize,
    pub normalize_text: bool,
}
impl Default for Input {
    fn default() -> Self {
        Self {
            report_column_name: "".into(),
            report_column_index: 8,
            normalize_text: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Batch {
    /// Rows per production run; 0 processes everything that remains.
    pub batch_size: usize,
    pub sample_size: usize,
    pub random_sample: bool,
    pub random_seed: Option<u64>,
}
impl Default for Batch {
    fn default() -> Self {
        Self {
            batch_size: 10,
            sample_size: 20,
            random_sample: true,
            random_seed: Some(789),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Inference {
    pub base_url: String,
    pub model: String,
    pub reasoning_effort: ReasoningEffort,
    pub temperature: f32,
    pub top_p: f32,
    pub num_predict: u32,
    pub availability_timeout_seconds: u64,
}
impl Default for Inference {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "gpt-oss:20b".into(),
            reasoning_effort: ReasoningEffort::Medium,
            temperature: 0.1,
            top_p: 0.9,
            num_predict: 4096,
            availability_timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Retry {
    pub max_attempts: u32,
    pub timeout_seconds: u64,
    pub retry_timeout_seconds: u64,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
}
impl Default for Retry {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            timeout_seconds: 300,
            retry_timeout_seconds: 600,
            initial_backoff_ms: 2_000,
            backoff_multiplier: 2.0,
            max_backoff_ms: 30_000,
        }
    }
}

impl Retry {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry_timeout(&self) -> Duration {
        Duration::from_secs(self.retry_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Classification {
    /// Empty uses the built-in instructions.
    pub instructions_path: String,
    pub prefilter_markers: bool,
    pub marker_pattern: String,
}
impl Default for Classification {
    fn default() -> Self {
        Self {
            instructions_path: "".into(),
            prefilter_markers: true,
            marker_pattern: "(?i)addend(um|a)".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}
