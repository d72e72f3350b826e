pub mod ollama;
pub mod types;

use std::time::Duration;

pub use types::{ChatReply, ChatRequest, ServiceDiag, ServiceError};

/// The inference service, seen as one blocking request/response exchange.
pub trait InferenceService {
    fn diagnose(&self, model: &str) -> ServiceDiag;
    fn chat(&self, req: &ChatRequest, timeout: Duration) -> Result<ChatReply, ServiceError>;
}

impl<E: InferenceService + ?Sized> InferenceService for &E {
    fn diagnose(&self, model: &str) -> ServiceDiag {
        (**self).diagnose(model)
    }

    fn chat(&self, req: &ChatRequest, timeout: Duration) -> Result<ChatReply, ServiceError> {
        (**self).chat(req, timeout)
    }
}
