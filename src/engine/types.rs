use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// One classification exchange, independent of any wire format.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub instructions: String,
    pub report_text: String,
    pub reasoning_effort: String,
    pub temperature: f32,
    pub top_p: f32,
    pub num_predict: u32,
}

/// What the service answered: the answer body and its reasoning trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub content: String,
    #[serde(default)]
    pub thinking: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDiag {
    pub base_url: String,
    pub model: String,
    pub reachable: bool,
    pub model_available: bool,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ServiceDiag {
    pub fn ok(&self) -> bool {
        self.reachable && self.model_available
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed service response: {message}")]
    Malformed { message: String, raw: String },
}

impl ServiceError {
    /// Timeouts, dropped connections and overloaded-server statuses.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connection(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Malformed { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classes() {
        assert!(ServiceError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ServiceError::Connection("refused".into()).is_transient());
        assert!(
            ServiceError::Status {
                status: 503,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !ServiceError::Status {
                status: 404,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !ServiceError::Malformed {
                message: "x".into(),
                raw: "y".into()
            }
            .is_transient()
        );
    }
}
