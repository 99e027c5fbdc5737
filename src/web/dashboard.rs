use axum::{extract::State, Json};
use axum_util::errors::{ApiError, ApiResult};
use log::info;
use serde::Deserialize;

use crate::{
    analyze::{AnalyzeEndpoint, AnalyzeRequest},
    dashboard::DashboardSnapshot,
};

use super::AppState;

#[derive(Deserialize)]
pub struct AnalyzeForm {
    pub video_url: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    #[serde(default)]
    pub endpoint: AnalyzeEndpoint,
}

pub async fn analyze(
    State(state): State<AppState>,
    Json(form): Json<AnalyzeForm>,
) -> ApiResult<Json<DashboardSnapshot>> {
    let video_url = form.video_url.trim();
    if video_url.is_empty() {
        return Err(ApiError::BadRequest("video_url is required".to_string()));
    }
    let request = AnalyzeRequest::new(video_url, form.lat, form.lon);

    let mut session = state.session.lock().await;
    session
        .refresh(state.analyze.as_ref(), form.endpoint, &request)
        .await;
    Ok(Json(session.snapshot()))
}

pub async fn snapshot(State(state): State<AppState>) -> Json<DashboardSnapshot> {
    Json(state.session.lock().await.snapshot())
}

pub async fn reset(State(state): State<AppState>) -> Json<DashboardSnapshot> {
    let mut session = state.session.lock().await;
    session.reset();
    info!("dashboard reset");
    Json(session.snapshot())
}
