use crate::{
    batch_plan::BatchPlan,
    checkpoint::{CheckpointStore, FileCheckpointStore, LoadStatus},
    classifier::Classifier,
    config::{Config, ReasoningEffort, RunMode},
    engine::{InferenceService, ollama::OllamaEngine},
    input,
    pipeline::{Interrupt, Pipeline},
    report::Progress,
    util::{ensure_dir, timestamp_slug},
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "addendum-triage")]
#[command(about = "Resumable batch classifier for imaging-related radiology report addenda")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./addendum-triage.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(flatten)]
    pub overrides: Overrides,
}

/// Command-line values applied on top of the config file, once, before a run.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct Overrides {
    #[arg(long, global = true, value_enum)]
    pub mode: Option<RunMode>,
    #[arg(long, global = true)]
    pub input: Option<PathBuf>,
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,
    /// Rows per production run; 0 means everything that remains.
    #[arg(long, global = true)]
    pub batch_size: Option<usize>,
    #[arg(long, global = true)]
    pub sample_size: Option<usize>,
    #[arg(long, global = true)]
    pub random_sample: Option<bool>,
    #[arg(long, global = true)]
    pub model: Option<String>,
    #[arg(long, global = true, value_enum)]
    pub reasoning_effort: Option<ReasoningEffort>,
}

impl Overrides {
    pub fn apply(&self, cfg: &mut Config) {
        if let Some(mode) = self.mode {
            cfg.run.mode = mode;
        }
        if let Some(p) = &self.input {
            cfg.paths.input_csv = p.display().to_string();
        }
        if let Some(p) = &self.output_dir {
            cfg.paths.output_dir = p.display().to_string();
        }
        if let Some(n) = self.batch_size {
            cfg.batch.batch_size = n;
        }
        if let Some(n) = self.sample_size {
            cfg.batch.sample_size = n;
        }
        if let Some(b) = self.random_sample {
            cfg.batch.random_sample = b;
        }
        if let Some(m) = &self.model {
            cfg.inference.model = m.clone();
        }
        if let Some(e) = self.reasoning_effort {
            cfg.inference.reasoning_effort = e;
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that the inference service is up and serves the configured model.
    Doctor {},
    /// Show the rows the next run would process, without classifying anything.
    Plan {},
    /// Show the production checkpoint and overall progress.
    Status {},
    /// Classify the next batch.
    Run {},
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref())?;
    let mut cfg = Config::load(&cfg_path)?;
    args.overrides.apply(&mut cfg);
    cfg.validate().with_context(|| "invalid configuration")?;
    let cfg = cfg;

    match &args.cmd {
        Command::Doctor {} => {
            let _guard = init_logging(&args, &cfg, None)?;
            doctor(&cfg)
        }
        Command::Plan {} => {
            let _guard = init_logging(&args, &cfg, None)?;
            plan(&cfg)
        }
        Command::Status {} => {
            let _guard = init_logging(&args, &cfg, None)?;
            status(&cfg)
        }
        Command::Run {} => {
            let log_path = resolve_log_path(&cfg);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            run(&cfg)
        }
    }
}

fn resolve_config_path(user: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = user {
        return Ok(p.to_path_buf());
    }
    let default = PathBuf::from("addendum-triage.toml");
    if default.exists() {
        Ok(default)
    } else {
        Ok(PathBuf::from("addendum-triage.example.toml"))
    }
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    if let Some(path) = file_path {
        info!("log file: {}", path.display());
    }

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    Some(cfg.output_dir().join("logs").join(format!(
        "processing_{}_{}.log",
        cfg.run.mode.as_str(),
        timestamp_slug()
    )))
}

fn doctor(cfg: &Config) -> Result<()> {
    let engine = OllamaEngine::new(cfg)?;
    let diag = engine.diagnose(&cfg.inference.model);
    println!("{}", serde_json::to_string_pretty(&diag)?);
    if !diag.ok() {
        return Err(anyhow!(
            "inference service not ready for model {:?}",
            cfg.inference.model
        ));
    }
    Ok(())
}

fn plan(cfg: &Config) -> Result<()> {
    let dataset = input::load_dataset(cfg)?;
    let checkpoint = match cfg.run.mode {
        RunMode::Production => {
            let store = FileCheckpointStore::new(&cfg.checkpoint_path());
            Some(store.load(&cfg.production_output_path()).state)
        }
        RunMode::Test => None,
    };
    let plan = BatchPlan::compute(cfg, dataset.len(), checkpoint.as_ref());
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "input": dataset.info(Path::new(&cfg.paths.input_csv)),
            "plan": plan,
        }))?
    );
    Ok(())
}

fn status(cfg: &Config) -> Result<()> {
    let store = FileCheckpointStore::new(&cfg.checkpoint_path());
    let loaded = store.load(&cfg.production_output_path());
    let status = match &loaded.status {
        LoadStatus::Missing => "missing".to_string(),
        LoadStatus::Loaded => "ok".to_string(),
        LoadStatus::Corrupt(reason) => format!("corrupt: {reason}"),
    };
    let total = match input::load_dataset(cfg) {
        Ok(ds) => ds.len(),
        Err(e) => {
            warn!("could not read input for progress: {e:#}");
            loaded.state.total_row_count
        }
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "checkpoint_path": store.path(),
            "checkpoint_status": status,
            "checkpoint": loaded.state,
            "progress": Progress::new(loaded.state.committed_rows(), total),
        }))?
    );
    Ok(())
}

fn run(cfg: &Config) -> Result<()> {
    info!(
        "mode={} input={} output_dir={} model={} reasoning_effort={}",
        cfg.run.mode.as_str(),
        cfg.paths.input_csv,
        cfg.paths.output_dir,
        cfg.inference.model,
        cfg.inference.reasoning_effort.as_str()
    );

    let interrupt = Interrupt::new();
    install_interrupt_handler(interrupt.clone())?;

    let engine = OllamaEngine::new(cfg)?;
    let classifier = Classifier::from_config(cfg, engine)?;
    let store = FileCheckpointStore::new(&cfg.checkpoint_path());
    let mut pipeline = Pipeline::new(cfg, classifier, store, interrupt);

    let outcome = pipeline.run()?;

    if cfg.run.print_summary {
        println!("{}", serde_json::to_string_pretty(&outcome.summary)?);
    }

    if let Some(p) = &outcome.summary.progress {
        if p.remaining_rows > 0 {
            info!("{} rows remain; run again to continue", p.remaining_rows);
        } else {
            info!("all {} rows have been processed", p.total_rows);
        }
    }

    Ok(())
}

/// First Ctrl-C asks the pipeline to stop after the current row; a second
/// one exits immediately.
fn install_interrupt_handler(interrupt: Interrupt) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .with_context(|| "building signal runtime")?;
    std::thread::Builder::new()
        .name("interrupt".into())
        .spawn(move || {
            rt.block_on(async move {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                warn!("interrupt requested; finishing the current row (Ctrl-C again to abort)");
                interrupt.request();
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("second interrupt, exiting without finishing the current row");
                    std::process::exit(130);
                }
            });
        })
        .with_context(|| "spawning interrupt thread")?;
    Ok(())
}
