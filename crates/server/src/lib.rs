use std::sync::Arc;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use relay::{ImagePayload, InferenceRequest, Relay};
use shared::{
    domain::ModelId,
    error::{ErrorBody, RelayError},
    protocol::{
        HealthResponse, InferenceResult, HEALTH_ROUTE, IMAGE_FIELD, MODEL_FIELD, PREDICT_ROUTE,
    },
};
use tracing::error;

pub mod config;

#[derive(Clone)]
pub struct AppState {
    pub relay: Relay,
    pub max_upload_bytes: usize,
}

type HttpFailure = (StatusCode, Json<ErrorBody>);

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(HEALTH_ROUTE, get(healthz))
        .route(PREDICT_ROUTE, post(predict))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        mode: state.relay.mode(),
        models: ModelId::ALL
            .iter()
            .map(|model| model.as_str().to_string())
            .collect(),
    })
}

async fn predict(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<InferenceResult>, HttpFailure> {
    let multipart = multipart.map_err(|rejection| {
        error!(%rejection, "predict request is not a multipart form");
        relay_failure(RelayError::internal())
    })?;

    let request = read_inference_form(multipart).await.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(ErrorBody::new(format!(
                    "image exceeds {} bytes",
                    state.max_upload_bytes
                ))),
            )
        } else {
            error!(error = %e, "failed to read predict form");
            relay_failure(RelayError::internal())
        }
    })?;

    let result = state.relay.handle(request).await.map_err(relay_failure)?;
    Ok(Json(result))
}

async fn read_inference_form(mut multipart: Multipart) -> Result<InferenceRequest, MultipartError> {
    let mut request = InferenceRequest::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(IMAGE_FIELD) => {
                let content_type = field.content_type().map(str::to_string);
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await?;
                request.image = Some(ImagePayload {
                    bytes: bytes.to_vec(),
                    content_type,
                    file_name,
                });
            }
            Some(MODEL_FIELD) => request.model = Some(field.text().await?),
            _ => {}
        }
    }
    Ok(request)
}

fn relay_failure(err: RelayError) -> HttpFailure {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err.into()))
}

#[cfg(test)]
#[path = "tests/routes_tests.rs"]
mod tests;
