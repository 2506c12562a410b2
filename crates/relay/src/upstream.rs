//! HTTP transport to the external inference service.

use std::{error::Error as _, io, time::Duration};

use reqwest::{
    multipart::{Form, Part},
    Client,
};
use shared::{
    error::ErrorBody,
    protocol::{InferenceResult, IMAGE_FIELD, MODEL_FIELD, PREDICT_ROUTE},
};
use thiserror::Error;

use crate::ImagePayload;

pub const GENERIC_UPSTREAM_MESSAGE: &str = "Inference server error";
const DEFAULT_UPLOAD_NAME: &str = "upload";

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("inference service unreachable: {0}")]
    Connection(#[source] reqwest::Error),
    #[error("inference service timed out: {0}")]
    Timeout(#[source] reqwest::Error),
    #[error("inference service returned {status}: {message}")]
    HttpStatus { status: u16, message: String },
    #[error("malformed inference response: {0}")]
    Decode(String),
    #[error("inference request failed: {0}")]
    Request(#[source] reqwest::Error),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        // A connect timeout reports both flags; it means the host is unreachable.
        if err.is_connect() {
            UpstreamError::Connection(err)
        } else if err.is_timeout() {
            UpstreamError::Timeout(err)
        } else if err.is_decode() {
            UpstreamError::Decode(err.to_string())
        } else if peer_dropped_connection(&err) {
            UpstreamError::Connection(err)
        } else {
            UpstreamError::Request(err)
        }
    }
}

/// The peer accepted the connection but closed or reset it before answering.
fn peer_dropped_connection(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        if let Some(hyper_err) = cause.downcast_ref::<hyper::Error>() {
            if hyper_err.is_incomplete_message() {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

#[derive(Clone)]
pub struct UpstreamClient {
    http: Client,
    predict_url: String,
}

impl UpstreamClient {
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self {
            http,
            predict_url: format!("{}{PREDICT_ROUTE}", base_url.trim_end_matches('/')),
        })
    }

    pub fn predict_url(&self) -> &str {
        &self.predict_url
    }

    pub async fn predict(
        &self,
        image: ImagePayload,
        model: &str,
    ) -> Result<InferenceResult, UpstreamError> {
        let mut part = Part::bytes(image.bytes).file_name(
            image
                .file_name
                .unwrap_or_else(|| DEFAULT_UPLOAD_NAME.to_string()),
        );
        if let Some(content_type) = image.content_type.as_deref() {
            part = part.mime_str(content_type)?;
        }
        let form = Form::new()
            .part(IMAGE_FIELD, part)
            .text(MODEL_FIELD, model.to_string());

        let response = self
            .http
            .post(&self.predict_url)
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&body)
                .ok()
                .map(|body| body.error)
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| GENERIC_UPSTREAM_MESSAGE.to_string());
            return Err(UpstreamError::HttpStatus {
                status: status.as_u16(),
                message,
            });
        }

        let result: InferenceResult = serde_json::from_slice(&body)
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;
        result
            .validate()
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;
        Ok(result)
    }
}
