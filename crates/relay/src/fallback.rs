//! Canned classification results served when the inference service is
//! unavailable or the relay runs in fallback-only mode.

use shared::{domain::ModelId, protocol::InferenceResult};

pub const FALLBACK_LATENCY_MS: u64 = 10;
pub const FALLBACK_TOTAL_LATENCY_MS: u64 = 15;

fn canned(model: ModelId) -> (&'static str, f64) {
    match model {
        ModelId::ResNet50 => ("Labrador Retriever", 0.88),
        ModelId::MobileNetV2 => ("Golden Retriever", 0.86),
        ModelId::InceptionV3 => ("Siamese Cat", 0.81),
        ModelId::EfficientNetB0 => ("Tabby Cat", 0.79),
    }
}

/// Unknown identifiers produce the default model's result, tagged with the
/// default model's name.
pub fn generate(model: &str) -> InferenceResult {
    let model = ModelId::resolve(Some(model));
    let (output, confidence) = canned(model);
    InferenceResult {
        model: model.as_str().to_string(),
        output: output.to_string(),
        confidence,
        latency: FALLBACK_LATENCY_MS,
        total_latency: Some(FALLBACK_TOTAL_LATENCY_MS),
    }
}
