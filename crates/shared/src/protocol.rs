use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PREDICT_ROUTE: &str = "/predict";
pub const HEALTH_ROUTE: &str = "/healthz";

/// Multipart field carrying the image bytes.
pub const IMAGE_FIELD: &str = "image";
/// Multipart field carrying the model identifier.
pub const MODEL_FIELD: &str = "model";

/// Classification outcome, either relayed from the inference service or
/// synthesized by the fallback generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    pub model: String,
    pub output: String,
    pub confidence: f64,
    /// Inference-attributable time in milliseconds.
    pub latency: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_latency: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidResult {
    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),
}

impl InferenceResult {
    pub fn validate(&self) -> Result<(), InvalidResult> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(InvalidResult::ConfidenceOutOfRange(self.confidence));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayMode {
    Live,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub mode: RelayMode,
    pub models: Vec<String>,
}
