use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use shared::{
    domain::ModelId,
    error::ErrorBody,
    protocol::{InferenceResult, IMAGE_FIELD, MODEL_FIELD, PREDICT_ROUTE},
};
use thiserror::Error;
use tracing::{error, info};

pub const FAILURE_NOTICE: &str = "Inference failed. Check the logs for details.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedImage {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl SelectedImage {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }
}

/// One completed run as shown in the results panel and the history log.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub model: String,
    pub label: String,
    pub confidence: f64,
    /// The relay's reported inference latency, not the observed round trip.
    pub latency_ms: u64,
    pub captured_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn from_result(result: InferenceResult, captured_at: DateTime<Utc>) -> Self {
        Self {
            model: result.model,
            label: result.output,
            confidence: result.confidence,
            latency_ms: result.latency,
            captured_at,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("relay returned {status}: {message}")]
    Relay { status: u16, message: String },
    #[error("relay request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed relay response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn predict(
        &self,
        image: &SelectedImage,
        model: ModelId,
    ) -> Result<InferenceResult, ClientError>;
}

/// Blocking, user-visible failure notification.
pub trait Notifier: Send + Sync {
    fn notify_failure(&self, message: &str);
}

impl<F> Notifier for F
where
    F: Fn(&str) + Send + Sync,
{
    fn notify_failure(&self, message: &str) {
        self(message)
    }
}

pub struct RelayClient {
    http: Client,
    relay_url: String,
}

impl RelayClient {
    pub fn new(relay_url: impl Into<String>) -> Self {
        let relay_url: String = relay_url.into();
        Self {
            http: Client::new(),
            relay_url: relay_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl InferenceBackend for RelayClient {
    async fn predict(
        &self,
        image: &SelectedImage,
        model: ModelId,
    ) -> Result<InferenceResult, ClientError> {
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.content_type)?;
        let form = Form::new()
            .part(IMAGE_FIELD, part)
            .text(MODEL_FIELD, model.as_str());

        let response = self
            .http
            .post(format!("{}{PREDICT_ROUTE}", self.relay_url))
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;

        // Any payload with an `error` field is a failure, whatever the status.
        if let Ok(ErrorBody { error }) = serde_json::from_slice::<ErrorBody>(&body) {
            return Err(ClientError::Relay {
                status: status.as_u16(),
                message: error,
            });
        }
        if !status.is_success() {
            return Err(ClientError::Relay {
                status: status.as_u16(),
                message: format!("relay responded with {status}"),
            });
        }

        serde_json::from_slice(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// No image selected.
    Skipped,
    Completed,
    Failed,
}

/// View state for one lab session. Nothing here outlives the session.
pub struct LabSession<B: InferenceBackend, N: Notifier> {
    backend: B,
    notifier: N,
    selected_image: Option<SelectedImage>,
    selected_model: ModelId,
    result: Option<HistoryEntry>,
    loading: bool,
    history: VecDeque<HistoryEntry>,
    history_limit: Option<usize>,
}

impl<B: InferenceBackend, N: Notifier> LabSession<B, N> {
    pub fn new(backend: B, notifier: N) -> Self {
        Self {
            backend,
            notifier,
            selected_image: None,
            selected_model: ModelId::default(),
            result: None,
            loading: false,
            history: VecDeque::new(),
            history_limit: None,
        }
    }

    /// Caps the history; the oldest entries are evicted first.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = Some(limit);
        self.truncate_history();
        self
    }

    pub fn select_image(&mut self, image: SelectedImage) {
        self.selected_image = Some(image);
    }

    pub fn clear_image(&mut self) {
        self.selected_image = None;
    }

    pub fn select_model(&mut self, model: ModelId) {
        if !self.loading {
            self.selected_model = model;
        }
    }

    pub fn selected_image(&self) -> Option<&SelectedImage> {
        self.selected_image.as_ref()
    }

    pub fn selected_model(&self) -> ModelId {
        self.selected_model
    }

    pub fn latest_result(&self) -> Option<&HistoryEntry> {
        self.result.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Newest first.
    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Whether the run control is enabled.
    pub fn can_run(&self) -> bool {
        self.selected_image.is_some() && !self.loading
    }

    /// Skipped when no image is selected. Overlapping runs are excluded by
    /// `&mut self`, the same way the disabled control excludes them in the UI.
    pub async fn run_inference(&mut self) -> RunOutcome {
        let Some(image) = self.selected_image.as_ref() else {
            return RunOutcome::Skipped;
        };
        let model = self.selected_model;

        self.loading = true;
        self.result = None;

        let response = self.backend.predict(image, model).await;
        let outcome = match response {
            Ok(result) => {
                let entry = HistoryEntry::from_result(result, Utc::now());
                info!(
                    model = %entry.model,
                    label = %entry.label,
                    latency_ms = entry.latency_ms,
                    "inference completed"
                );
                self.result = Some(entry.clone());
                self.history.push_front(entry);
                self.truncate_history();
                RunOutcome::Completed
            }
            Err(error) => {
                error!(%model, %error, "inference failed");
                self.notifier.notify_failure(FAILURE_NOTICE);
                RunOutcome::Failed
            }
        };

        self.loading = false;
        outcome
    }

    fn truncate_history(&mut self) {
        if let Some(limit) = self.history_limit {
            self.history.truncate(limit);
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
