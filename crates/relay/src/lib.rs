use std::time::Duration;

use anyhow::Context;
use shared::{
    domain::ModelId,
    error::RelayError,
    protocol::{InferenceResult, RelayMode},
};
use tracing::{debug, error, warn};

pub mod fallback;
pub mod upstream;

use upstream::{UpstreamClient, UpstreamError};

pub const DEFAULT_BASE_URL: &str = "https://web-production-b607.up.railway.app";
/// Base URL value that forces fallback-only mode.
pub const FALLBACK_SENTINEL: &str = "mock";
pub const NO_IMAGE_MESSAGE: &str = "No image provided";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub file_name: Option<String>,
}

impl ImagePayload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: None,
            file_name: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct InferenceRequest {
    pub image: Option<ImagePayload>,
    pub model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub base_url: String,
    pub fallback_mode: bool,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl RelayConfig {
    pub fn from_base_url(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let fallback_mode = base_url.trim() == FALLBACK_SENTINEL;
        Self {
            base_url,
            fallback_mode,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, request_timeout: Duration, connect_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self.connect_timeout = connect_timeout;
        self
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from_base_url(DEFAULT_BASE_URL)
    }
}

/// Forwards classification requests to the inference service, substituting a
/// canned result when the service cannot be reached.
#[derive(Clone)]
pub struct Relay {
    config: RelayConfig,
    upstream: UpstreamClient,
}

impl Relay {
    pub fn new(config: RelayConfig) -> anyhow::Result<Self> {
        let upstream = UpstreamClient::new(
            &config.base_url,
            config.request_timeout,
            config.connect_timeout,
        )
        .with_context(|| format!("failed to build HTTP client for '{}'", config.base_url))?;
        Ok(Self { config, upstream })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn mode(&self) -> RelayMode {
        if self.config.fallback_mode {
            RelayMode::Fallback
        } else {
            RelayMode::Live
        }
    }

    pub async fn handle(&self, request: InferenceRequest) -> Result<InferenceResult, RelayError> {
        let Some(image) = request.image.filter(|image| !image.bytes.is_empty()) else {
            return Err(RelayError::validation(NO_IMAGE_MESSAGE));
        };
        let model = resolve_model_name(request.model);

        if self.config.fallback_mode {
            debug!(%model, "fallback mode; serving canned result");
            return Ok(fallback::generate(&model));
        }

        match self.upstream.predict(image, &model).await {
            Ok(result) => Ok(result),
            Err(UpstreamError::Connection(error)) => {
                warn!(
                    %model,
                    url = self.upstream.predict_url(),
                    %error,
                    "inference service unreachable; serving fallback result"
                );
                Ok(fallback::generate(&model))
            }
            Err(UpstreamError::HttpStatus { status, message }) => {
                warn!(%model, status, %message, "inference service rejected request");
                Err(RelayError::upstream(status, message))
            }
            Err(UpstreamError::Timeout(error)) => {
                warn!(%model, %error, "inference service timed out");
                Err(RelayError::timeout())
            }
            Err(error) => {
                error!(%model, %error, "inference relay failed");
                Err(RelayError::internal())
            }
        }
    }
}

/// Blank identifiers become the default model; anything else is forwarded
/// verbatim so the inference service can reject it.
fn resolve_model_name(raw: Option<String>) -> String {
    match raw {
        Some(model) if !model.trim().is_empty() => model,
        _ => ModelId::default().as_str().to_string(),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
