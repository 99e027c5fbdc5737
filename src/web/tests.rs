use std::sync::Mutex;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    response::Response,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::*;
use crate::{
    analyze::{AnalyzeEndpoint, AnalyzeRequest, FetchError},
    gateway::tests::{body_json, reply, scripted, BASE},
};

/// Answers every analyze call with the same body and records the requests.
struct FixedBackend {
    body: String,
    requests: Mutex<Vec<(AnalyzeEndpoint, AnalyzeRequest)>>,
}

#[async_trait]
impl AnalyzeBackend for FixedBackend {
    async fn analyze(
        &self,
        endpoint: AnalyzeEndpoint,
        request: &AnalyzeRequest,
    ) -> Result<String, FetchError> {
        self.requests
            .lock()
            .unwrap()
            .push((endpoint, request.clone()));
        Ok(self.body.clone())
    }
}

fn dashboard_app(backend_body: Value) -> (Router, Arc<FixedBackend>) {
    let (gateway, _) = scripted(Some(BASE), |url| {
        if url.ends_with("/video-count-population") {
            Ok(reply(404, None, "Not Found"))
        } else {
            Ok(reply(201, Some("application/json"), r#"{"queued":true}"#))
        }
    });
    let backend = Arc::new(FixedBackend {
        body: backend_body.to_string(),
        requests: Mutex::new(vec![]),
    });
    let state = AppState::new(gateway, backend.clone());
    (routes("/api/video-count-population").with_state(state), backend)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Response {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(body) => {
            request = request.header(CONTENT_TYPE, "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };
    app.clone().oneshot(request.body(body).unwrap()).await.unwrap()
}

#[tokio::test]
async fn health_answers_ok() {
    let (app, _) = dashboard_app(json!({}));
    let response = send(&app, Method::GET, "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn gateway_route_passes_upstream_status_through() {
    let (app, _) = dashboard_app(json!({}));
    let response = send(
        &app,
        Method::POST,
        "/api/video-count-population",
        Some(json!({ "video_url": "https://cdn/x.mp4" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await, json!({ "queued": true }));
}

#[tokio::test]
async fn gateway_route_rejects_non_json_body() {
    let (app, _) = dashboard_app(json!({}));
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/video-count-population")
        .body(Body::from("video_url=x"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn blank_video_url_is_rejected() {
    let (app, backend) = dashboard_app(json!({}));
    let response = send(
        &app,
        Method::POST,
        "/dashboard/analyze",
        Some(json!({ "video_url": "   " })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({ "message": "video_url is required" })
    );
    assert!(backend.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn analyze_accumulates_until_reset() {
    let (app, backend) = dashboard_app(json!({
        "human_detected": true,
        "lat": 28.7041,
        "lon": 77.1025,
        "timestamps": [1, 2],
    }));
    for _ in 0..2 {
        let response = send(
            &app,
            Method::POST,
            "/dashboard/analyze",
            Some(json!({ "video_url": " https://cdn/x.mp4 ", "lat": 28.7, "endpoint": "analyze" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    {
        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].0, AnalyzeEndpoint::Analyze);
        assert_eq!(
            requests[0].1,
            AnalyzeRequest::new("https://cdn/x.mp4", Some(28.7), None)
        );
    }

    let snapshot = body_json(send(&app, Method::GET, "/dashboard", None).await).await;
    assert_eq!(snapshot["loading"], false);
    assert_eq!(snapshot["person_found"], true);
    assert_eq!(snapshot["total_count"], 2);
    assert_eq!(snapshot["targets"].as_array().unwrap().len(), 2);
    assert_eq!(snapshot["latest_detection"]["cctv_id"], "DRONE");

    let response = send(&app, Method::DELETE, "/dashboard", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let snapshot = body_json(response).await;
    assert_eq!(snapshot["targets"], json!([]));
    assert_eq!(snapshot["person_found"], Value::Null);
    assert_eq!(snapshot["timeline"], json!([]));
}
