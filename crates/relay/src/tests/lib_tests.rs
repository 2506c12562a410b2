use super::*;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::post,
    Router,
};
use serde_json::json;
use shared::error::{ErrorCode, INTERNAL_ERROR_MESSAGE};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Debug, Clone, Default)]
struct ReceivedForm {
    model: Option<String>,
    image: Option<Vec<u8>>,
    file_name: Option<String>,
    content_type: Option<String>,
}

#[derive(Clone)]
struct UpstreamState {
    hits: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<ReceivedForm>>>,
    status: StatusCode,
    body: String,
    delay: Option<Duration>,
}

impl UpstreamState {
    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn handle_predict(
    State(state): State<UpstreamState>,
    mut multipart: Multipart,
) -> (StatusCode, String) {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let mut form = ReceivedForm::default();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                form.file_name = field.file_name().map(str::to_string);
                form.content_type = field.content_type().map(str::to_string);
                form.image = field.bytes().await.ok().map(|bytes| bytes.to_vec());
            }
            Some("model") => form.model = field.text().await.ok(),
            _ => {}
        }
    }
    state.received.lock().await.push(form);
    if let Some(delay) = state.delay {
        tokio::time::sleep(delay).await;
    }
    (state.status, state.body.clone())
}

async fn spawn_upstream(
    status: StatusCode,
    body: impl Into<String>,
    delay: Option<Duration>,
) -> (String, UpstreamState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = UpstreamState {
        hits: Arc::new(AtomicUsize::new(0)),
        received: Arc::new(Mutex::new(Vec::new())),
        status,
        body: body.into(),
        delay,
    };
    let app = Router::new()
        .route("/predict", post(handle_predict))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), state)
}

fn refused_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    format!("http://{addr}")
}

fn live_relay(base_url: &str) -> Relay {
    Relay::new(RelayConfig::from_base_url(base_url)).expect("relay")
}

fn request(model: Option<&str>) -> InferenceRequest {
    InferenceRequest {
        image: Some(
            ImagePayload::new(b"\x89PNG-test-image".to_vec())
                .with_content_type("image/png")
                .with_file_name("dog.png"),
        ),
        model: model.map(str::to_string),
    }
}

#[test]
fn mock_sentinel_enables_fallback_mode() {
    assert!(RelayConfig::from_base_url("mock").fallback_mode);
    assert!(RelayConfig::from_base_url(" mock ").fallback_mode);
    assert!(!RelayConfig::from_base_url("http://mock.internal").fallback_mode);
    assert!(!RelayConfig::default().fallback_mode);
}

#[test]
fn predict_url_trims_trailing_slash() {
    let relay = live_relay("http://127.0.0.1:9/");
    assert_eq!(relay.upstream.predict_url(), "http://127.0.0.1:9/predict");
}

#[tokio::test]
async fn fallback_mode_returns_canned_result_for_resnet() {
    let relay = Relay::new(RelayConfig::from_base_url("mock")).expect("relay");
    assert_eq!(relay.mode(), RelayMode::Fallback);

    let result = relay.handle(request(Some("ResNet50"))).await.expect("result");
    assert_eq!(
        serde_json::to_value(result).expect("json"),
        json!({
            "model": "ResNet50",
            "output": "Labrador Retriever",
            "confidence": 0.88,
            "latency": 10,
            "total_latency": 15,
        })
    );
}

#[tokio::test]
async fn missing_image_is_rejected_without_outbound_call() {
    let (base_url, upstream) = spawn_upstream(StatusCode::OK, "{}", None).await;
    let relay = live_relay(&base_url);

    let err = relay
        .handle(InferenceRequest {
            image: None,
            model: Some("ResNet50".into()),
        })
        .await
        .expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Validation);
    assert_eq!(err.http_status(), 400);
    assert_eq!(err.message, NO_IMAGE_MESSAGE);

    let err = relay
        .handle(InferenceRequest {
            image: Some(ImagePayload::new(Vec::new())),
            model: None,
        })
        .await
        .expect_err("should fail");
    assert_eq!(err.http_status(), 400);
    assert_eq!(upstream.hits(), 0);
}

#[tokio::test]
async fn connection_refused_serves_fallback_result() {
    let relay = live_relay(&refused_base_url());
    assert_eq!(relay.mode(), RelayMode::Live);

    let result = relay.handle(request(Some("ResNet50"))).await.expect("result");
    assert_eq!(result, fallback::generate("ResNet50"));
    assert_eq!(result.output, "Labrador Retriever");
}

#[tokio::test]
async fn successful_upstream_body_is_relayed_unchanged() {
    let body = json!({ "model": "X", "output": "Y", "confidence": 0.5, "latency": 20 });
    let (base_url, upstream) = spawn_upstream(StatusCode::OK, body.to_string(), None).await;
    let relay = live_relay(&base_url);

    let result = relay.handle(request(Some("X"))).await.expect("result");
    assert_eq!(serde_json::to_value(&result).expect("json"), body);

    let received = upstream.received.lock().await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].model.as_deref(), Some("X"));
    assert_eq!(received[0].image.as_deref(), Some(&b"\x89PNG-test-image"[..]));
    assert_eq!(received[0].file_name.as_deref(), Some("dog.png"));
    assert_eq!(received[0].content_type.as_deref(), Some("image/png"));
}

#[tokio::test]
async fn blank_model_is_forwarded_as_default() {
    let body = json!({ "model": "MobileNetV2", "output": "Pug", "confidence": 0.7, "latency": 4 });
    let (base_url, upstream) = spawn_upstream(StatusCode::OK, body.to_string(), None).await;
    let relay = live_relay(&base_url);

    relay.handle(request(None)).await.expect("result");
    relay.handle(request(Some(""))).await.expect("result");

    let received = upstream.received.lock().await;
    assert!(received
        .iter()
        .all(|form| form.model.as_deref() == Some("MobileNetV2")));
}

#[tokio::test]
async fn upstream_failure_status_and_message_are_relayed() {
    let (base_url, _upstream) = spawn_upstream(
        StatusCode::SERVICE_UNAVAILABLE,
        json!({ "error": "busy" }).to_string(),
        None,
    )
    .await;
    let relay = live_relay(&base_url);

    let err = relay
        .handle(request(Some("ResNet50")))
        .await
        .expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Upstream);
    assert_eq!(err.http_status(), 503);
    assert_eq!(err.message, "busy");
}

#[tokio::test]
async fn upstream_failure_without_error_field_uses_generic_message() {
    let (base_url, _upstream) =
        spawn_upstream(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>", None).await;
    let relay = live_relay(&base_url);

    let err = relay.handle(request(None)).await.expect_err("should fail");
    assert_eq!(err.http_status(), 502);
    assert_eq!(err.message, upstream::GENERIC_UPSTREAM_MESSAGE);
}

#[tokio::test]
async fn malformed_success_body_is_an_internal_failure() {
    let (base_url, _upstream) =
        spawn_upstream(StatusCode::OK, json!({ "label": "cat" }).to_string(), None).await;
    let relay = live_relay(&base_url);

    let err = relay.handle(request(None)).await.expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Internal);
    assert_eq!(err.http_status(), 500);
    assert_eq!(err.message, INTERNAL_ERROR_MESSAGE);
}

#[tokio::test]
async fn out_of_range_confidence_is_an_internal_failure() {
    let body = json!({ "model": "X", "output": "Y", "confidence": 3.0, "latency": 1 });
    let (base_url, _upstream) = spawn_upstream(StatusCode::OK, body.to_string(), None).await;
    let relay = live_relay(&base_url);

    let err = relay.handle(request(None)).await.expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Internal);
}

#[tokio::test]
async fn slow_upstream_reports_timeout_instead_of_fallback() {
    let body = json!({ "model": "X", "output": "Y", "confidence": 0.5, "latency": 20 });
    let (base_url, _upstream) = spawn_upstream(
        StatusCode::OK,
        body.to_string(),
        Some(Duration::from_secs(3)),
    )
    .await;
    let relay = Relay::new(
        RelayConfig::from_base_url(base_url)
            .with_timeouts(Duration::from_millis(300), Duration::from_secs(1)),
    )
    .expect("relay");

    let err = relay.handle(request(None)).await.expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Timeout);
    assert_eq!(err.http_status(), 504);
}

async fn spawn_dropping_upstream() -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            drop(socket);
        }
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn peer_dropping_connection_serves_fallback_result() {
    let relay = live_relay(&spawn_dropping_upstream().await);

    let result = relay.handle(request(Some("ResNet50"))).await.expect("result");
    assert_eq!(result, fallback::generate("ResNet50"));
}

#[tokio::test]
async fn connect_timeout_serves_fallback_result() {
    // Non-routable address: the connect either times out or is refused by the network.
    let relay = Relay::new(
        RelayConfig::from_base_url("http://10.255.255.1:81")
            .with_timeouts(Duration::from_secs(5), Duration::from_millis(50)),
    )
    .expect("relay");

    let result = relay.handle(request(Some("InceptionV3"))).await.expect("result");
    assert_eq!(result, fallback::generate("InceptionV3"));
}
