use super::{InferenceService, types::*};
use crate::config::Config;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Ollama's native chat API over blocking HTTP.
pub struct OllamaEngine {
    client: reqwest::blocking::Client,
    base_url: String,
    availability_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    stream: bool,
    format: &'a str,
    think: &'a str,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    thinking: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

impl OllamaEngine {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            // Per-request timeouts come from the retry policy.
            .timeout(None::<Duration>)
            .build()
            .with_context(|| "building HTTP client")?;
        Ok(Self {
            client,
            base_url: cfg.inference.base_url.trim_end_matches('/').to_string(),
            availability_timeout: Duration::from_secs(
                cfg.inference.availability_timeout_seconds.max(1),
            ),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn list_models(&self) -> Result<Vec<String>, ServiceError> {
        let resp = self
            .client
            .get(self.url("/api/tags"))
            .timeout(self.availability_timeout)
            .send()
            .map_err(|e| transport_error(e, self.availability_timeout))?;
        let status = resp.status();
        let text = resp
            .text()
            .map_err(|e| transport_error(e, self.availability_timeout))?;
        if !status.is_success() {
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body: clip(&text, 500),
            });
        }
        let tags: TagsResponse = serde_json::from_str(&text).map_err(|e| ServiceError::Malformed {
            message: format!("tags response: {e}"),
            raw: text.clone(),
        })?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

impl InferenceService for OllamaEngine {
    fn diagnose(&self, model: &str) -> ServiceDiag {
        match self.list_models() {
            Ok(models) => ServiceDiag {
                base_url: self.base_url.clone(),
                model: model.to_string(),
                reachable: true,
                model_available: models.iter().any(|m| m.contains(model)),
                models,
                error: None,
            },
            Err(e) => ServiceDiag {
                base_url: self.base_url.clone(),
                model: model.to_string(),
                reachable: false,
                model_available: false,
                models: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }

    fn chat(&self, req: &ChatRequest, timeout: Duration) -> Result<ChatReply, ServiceError> {
        let user = format!("Radiology report:\n\n{}", req.report_text);
        let body = ChatBody {
            model: &req.model,
            messages: vec![
                Message {
                    role: "system",
                    content: &req.instructions,
                },
                Message {
                    role: "user",
                    content: &user,
                },
            ],
            stream: false,
            format: "json",
            think: &req.reasoning_effort,
            options: ChatOptions {
                temperature: req.temperature,
                top_p: req.top_p,
                num_predict: req.num_predict,
            },
        };

        debug!(model = %req.model, timeout = ?timeout, "sending chat request");
        let resp = self
            .client
            .post(self.url("/api/chat"))
            .timeout(timeout)
            .json(&body)
            .send()
            .map_err(|e| transport_error(e, timeout))?;

        let status = resp.status();
        let text = resp.text().map_err(|e| transport_error(e, timeout))?;
        debug!(status = status.as_u16(), bytes = text.len(), "chat response received");

        if !status.is_success() {
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body: clip(&text, 500),
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| ServiceError::Malformed {
                message: format!("chat response: {e}"),
                raw: text.clone(),
            })?;

        Ok(ChatReply {
            content: parsed.message.content,
            thinking: parsed.message.thinking.unwrap_or_default(),
        })
    }
}

fn transport_error(e: reqwest::Error, timeout: Duration) -> ServiceError {
    if e.is_timeout() {
        ServiceError::Timeout(timeout)
    } else {
        ServiceError::Connection(e.to_string())
    }
}

fn clip(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_respects_char_boundaries() {
        assert_eq!(clip("ééé", 2), "éé...");
        assert_eq!(clip("short", 10), "short");
    }

    #[test]
    fn reply_without_thinking_parses() {
        let parsed: ChatResponse =
            serde_json::from_str(r#"{"message":{"role":"assistant","content":"{}"}}"#).unwrap();
        assert_eq!(parsed.message.content, "{}");
        assert!(parsed.message.thinking.is_none());
    }
}
