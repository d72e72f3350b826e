use crate::{
    config::Config,
    engine::{ChatReply, ChatRequest, InferenceService, ServiceError},
    policy::RetryPolicy,
    prompt,
    text::normalize_report,
};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Reasoning cell for answers that carried no rationale.
pub const NO_REASONING: &str = "No reasoning returned";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Imaging,
    NotImaging,
    Error,
}

impl Verdict {
    /// Value written to the `Imaging Related Addendum` column.
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Imaging => "Yes",
            Verdict::NotImaging => "No",
            Verdict::Error => "Error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub verdict: Verdict,
    /// Only ever set for `Imaging`.
    pub addendum: Option<String>,
    pub reasoning: String,
    /// Service calls spent on this report; 0 when short-circuited.
    pub attempts: u32,
}

impl ClassificationResult {
    pub fn imaging(addendum: Option<String>, reasoning: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Imaging,
            addendum,
            reasoning: reasoning.into(),
            attempts: 0,
        }
    }

    pub fn not_imaging(reasoning: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::NotImaging,
            addendum: None,
            reasoning: reasoning.into(),
            attempts: 0,
        }
    }

    pub fn error(reasoning: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Error,
            addendum: None,
            reasoning: reasoning.into(),
            attempts: 0,
        }
    }

    fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

/// Fixed request settings shared by every call of a run.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    pub model: String,
    pub reasoning_effort: String,
    pub instructions: String,
    pub temperature: f32,
    pub top_p: f32,
    pub num_predict: u32,
}

impl RequestTemplate {
    pub fn from_config(cfg: &Config, instructions: String) -> Self {
        Self {
            model: cfg.inference.model.clone(),
            reasoning_effort: cfg.inference.reasoning_effort.as_str().to_string(),
            instructions,
            temperature: cfg.inference.temperature,
            top_p: cfg.inference.top_p,
            num_predict: cfg.inference.num_predict,
        }
    }

    fn request(&self, report_text: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            instructions: self.instructions.clone(),
            report_text: report_text.to_string(),
            reasoning_effort: self.reasoning_effort.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
            num_predict: self.num_predict,
        }
    }
}

pub struct Classifier<E: InferenceService> {
    engine: E,
    template: RequestTemplate,
    policy: RetryPolicy,
    marker: Option<Regex>,
    normalize: bool,
}

impl<E: InferenceService> Classifier<E> {
    pub fn new(
        engine: E,
        template: RequestTemplate,
        policy: RetryPolicy,
        marker: Option<Regex>,
        normalize: bool,
    ) -> Self {
        Self {
            engine,
            template,
            policy,
            marker,
            normalize,
        }
    }

    pub fn from_config(cfg: &Config, engine: E) -> Result<Self> {
        let instructions = prompt::load_instructions(cfg)?;
        let marker = if cfg.classification.prefilter_markers {
            Some(
                Regex::new(&cfg.classification.marker_pattern)
                    .with_context(|| "compiling classification.marker_pattern")?,
            )
        } else {
            None
        };
        Ok(Self::new(
            engine,
            RequestTemplate::from_config(cfg, instructions),
            RetryPolicy::from_config(cfg),
            marker,
            cfg.input.normalize_text,
        ))
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn model(&self) -> &str {
        &self.template.model
    }

    pub fn classify(&self, report_text: &str) -> ClassificationResult {
        let text = if self.normalize {
            normalize_report(report_text)
        } else {
            report_text.to_string()
        };

        if text.trim().is_empty() {
            debug!("empty report text, skipping service call");
            return ClassificationResult::not_imaging("Empty report");
        }

        if let Some(marker) = &self.marker {
            if !marker.is_match(&text) {
                debug!("no addendum marker, skipping service call");
                return ClassificationResult::not_imaging("No addendum marker found");
            }
        }

        let req = self.template.request(&text);
        match self.call_with_retries(&req) {
            Ok((reply, attempts)) => parse_reply(&reply).with_attempts(attempts),
            Err((ServiceError::Malformed { message, raw }, attempts)) => {
                ClassificationResult::error(format!("malformed service response ({message}): {raw}"))
                    .with_attempts(attempts)
            }
            Err((err, attempts)) => ClassificationResult::error(format!(
                "classification failed after {attempts} attempt(s): {err}"
            ))
            .with_attempts(attempts),
        }
    }

    fn call_with_retries(
        &self,
        req: &ChatRequest,
    ) -> std::result::Result<(ChatReply, u32), (ServiceError, u32)> {
        let mut attempt = 1;
        loop {
            let timeout = self.policy.timeout_for(attempt);
            match self.engine.chat(req, timeout) {
                Ok(reply) => return Ok((reply, attempt)),
                Err(err) if err.is_transient() && self.policy.has_attempt_after(attempt) => {
                    let pause = self.policy.backoff_after(attempt);
                    warn!(
                        "attempt {}/{} failed: {err}; retrying in {:?}",
                        attempt, self.policy.max_attempts, pause
                    );
                    if !pause.is_zero() {
                        std::thread::sleep(pause);
                    }
                    attempt += 1;
                }
                Err(err) => {
                    warn!("attempt {}/{} failed: {err}; giving up", attempt, self.policy.max_attempts);
                    return Err((err, attempt));
                }
            }
        }
    }
}

/// Maps a service answer onto a verdict. Anything off-shape is an `Error`.
pub fn parse_reply(reply: &ChatReply) -> ClassificationResult {
    let content = reply.content.trim();
    let malformed = |why: &str| {
        ClassificationResult::error(format!("unparseable answer ({why}): {}", reply.content))
    };

    let value: Value = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(e) => return malformed(&format!("not JSON: {e}")),
    };
    let Some(obj) = value.as_object() else {
        return malformed("not a JSON object");
    };

    let verdict = match obj.get("is_imaging_related") {
        Some(Value::Bool(true)) => Verdict::Imaging,
        Some(Value::Bool(false)) => Verdict::NotImaging,
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "true" => Verdict::Imaging,
            "no" | "false" => Verdict::NotImaging,
            _ => return malformed(&format!("unknown is_imaging_related value {s:?}")),
        },
        Some(_) => return malformed("is_imaging_related has the wrong type"),
        None => return malformed("missing is_imaging_related"),
    };

    let addendum = match obj.get("addendum_content") {
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(Value::Null) => None,
        Some(_) => return malformed("addendum_content has the wrong type"),
        None => return malformed("missing addendum_content"),
    };

    let reasoning = if !reply.thinking.trim().is_empty() {
        reply.thinking.trim().to_string()
    } else {
        obj.get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string()
    };
    let reasoning = if reasoning.is_empty() {
        NO_REASONING.to_string()
    } else {
        reasoning
    };

    match verdict {
        Verdict::Imaging => {
            let addendum = addendum.filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("none"));
            ClassificationResult::imaging(addendum, reasoning)
        }
        _ => ClassificationResult::not_imaging(reasoning),
    }
}
