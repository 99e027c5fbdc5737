use std::sync::Arc;

use axum::{routing, Json, Router};
use axum_util::logger::{LoggerConfig, LoggerLayer};
use log::Level;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::{
    analyze::{AnalyzeBackend, AnalyzeClient},
    config::Config,
    dashboard::DashboardSession,
    gateway::Gateway,
};

mod dashboard;
mod proxy;

const RESPONSE_METRIC: &str = "eagle_eye_web_responses";

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub analyze: Arc<dyn AnalyzeBackend>,
    /// The one dashboard this process serves. Analyze calls queue behind each other.
    pub session: Arc<Mutex<DashboardSession>>,
}

impl AppState {
    pub fn new(gateway: Gateway, analyze: Arc<dyn AnalyzeBackend>) -> Self {
        Self {
            gateway: Arc::new(gateway),
            analyze,
            session: Default::default(),
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(
            Gateway::with_http(config.gateway())?,
            Arc::new(AnalyzeClient::new(config.analyze())?),
        ))
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Polled routes stay out of the info log.
fn log_level(path: &str) -> Level {
    match path {
        "/health" | "/dashboard" => Level::Debug,
        _ => Level::Info,
    }
}

fn routes(gateway_route: &str) -> Router<AppState> {
    Router::new()
        .route(gateway_route, routing::post(proxy::proxy))
        .route(
            "/dashboard",
            routing::get(dashboard::snapshot).delete(dashboard::reset),
        )
        .route("/dashboard/analyze", routing::post(dashboard::analyze))
        .route("/health", routing::get(health))
}

pub fn route(gateway_route: &str, state: AppState) -> Router {
    // registers the response histogram, so only built once per process
    let logger = LoggerLayer::new(LoggerConfig {
        log_level_filter: Arc::new(log_level),
        honor_xff: true,
        metric_name: RESPONSE_METRIC.to_string(),
    });
    routes(gateway_route).with_state(state).layer(logger)
}

#[cfg(test)]
mod tests;
