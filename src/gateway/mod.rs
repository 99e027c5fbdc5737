//! Forwards dashboard JSON requests to the analysis backend.
//!
//! The backend has been deployed under several spellings of the same route, so each
//! request walks an ordered list of candidate paths and the first response that is
//! not a 404 wins.

use std::time::Duration;

use axum::{
    body::Bytes,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use log::{debug, error, info, warn};
use prometheus::{register_int_counter_vec, IntCounterVec};
use serde::Serialize;
use serde_json::Value;
use url::Url;

mod candidates;
mod upstream;

pub use candidates::{candidate_paths, join_url};
pub use upstream::{HttpUpstream, Upstream, UpstreamError, UpstreamReply};

lazy_static::lazy_static! {
    static ref GATEWAY_ATTEMPTS: IntCounterVec = register_int_counter_vec!("eagle_eye_gateway_attempts", "upstream attempts by response status", &["status"]).unwrap();
    static ref GATEWAY_OUTCOMES: IntCounterVec = register_int_counter_vec!("eagle_eye_gateway_outcomes", "gateway results by outcome", &["outcome"]).unwrap();
}

const NO_REACHABLE_ENDPOINT: &str = "No reachable endpoint";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub upstream_url: Option<Url>,
    pub upstream_path: String,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamBody {
    Json(Value),
    Text { content_type: String, text: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayOutcome {
    /// First non-404 response was a success.
    Success { status: StatusCode, body: UpstreamBody },
    /// First non-404 response was a failure, passed through with its status.
    UpstreamError {
        status: StatusCode,
        error: String,
        upstream: Option<Value>,
        tried: Vec<String>,
    },
    /// Every candidate answered 404 or failed in transport.
    Exhausted { details: String, tried: Vec<String> },
    /// No upstream URL configured.
    ConfigError,
    /// The inbound body is not JSON.
    InvalidRequest(String),
}

impl GatewayOutcome {
    fn label(&self) -> &'static str {
        match self {
            GatewayOutcome::Success { .. } => "success",
            GatewayOutcome::UpstreamError { .. } => "upstream_error",
            GatewayOutcome::Exhausted { .. } => "exhausted",
            GatewayOutcome::ConfigError => "config_error",
            GatewayOutcome::InvalidRequest(_) => "invalid_request",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayOutcome::Success { status, .. } | GatewayOutcome::UpstreamError { status, .. } => {
                *status
            }
            GatewayOutcome::Exhausted { .. } => StatusCode::BAD_GATEWAY,
            GatewayOutcome::ConfigError | GatewayOutcome::InvalidRequest(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Error body returned for every non-success outcome.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub tried_paths: Vec<String>,
}

impl IntoResponse for GatewayOutcome {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_body = match self {
            GatewayOutcome::Success {
                body: UpstreamBody::Json(value),
                ..
            } => return (status, Json(value)).into_response(),
            GatewayOutcome::Success {
                body: UpstreamBody::Text { content_type, text },
                ..
            } => return (status, [(CONTENT_TYPE, content_type)], text).into_response(),
            GatewayOutcome::UpstreamError {
                error,
                upstream,
                tried,
                ..
            } => GatewayErrorBody {
                error,
                upstream,
                details: None,
                tried_paths: tried,
            },
            GatewayOutcome::Exhausted { details, tried } => GatewayErrorBody {
                error: "Upstream not found or failed".to_string(),
                upstream: None,
                details: Some(details),
                tried_paths: tried,
            },
            GatewayOutcome::ConfigError => GatewayErrorBody {
                error: "Backend URL not configured".to_string(),
                upstream: None,
                details: None,
                tried_paths: vec![],
            },
            GatewayOutcome::InvalidRequest(message) => GatewayErrorBody {
                error: message,
                upstream: None,
                details: None,
                tried_paths: vec![],
            },
        };
        (status, Json(error_body)).into_response()
    }
}

pub struct Gateway {
    config: GatewayConfig,
    upstream: Box<dyn Upstream>,
}

impl Gateway {
    pub fn new(config: GatewayConfig, upstream: Box<dyn Upstream>) -> Self {
        Self { config, upstream }
    }

    pub fn with_http(config: GatewayConfig) -> Result<Self, UpstreamError> {
        let upstream = HttpUpstream::new(config.timeout)?;
        Ok(Self::new(config, Box::new(upstream)))
    }

    pub async fn forward(&self, body: Bytes) -> GatewayOutcome {
        let outcome = self.run(body).await;
        GATEWAY_OUTCOMES.with_label_values(&[outcome.label()]).inc();
        outcome
    }

    async fn run(&self, body: Bytes) -> GatewayOutcome {
        let Some(base) = &self.config.upstream_url else {
            error!("upstream url is not configured");
            return GatewayOutcome::ConfigError;
        };
        if let Err(e) = serde_json::from_slice::<Value>(&body) {
            warn!("rejecting non-json proxy body: {e}");
            return GatewayOutcome::InvalidRequest(e.to_string());
        }

        let mut tried = vec![];
        let mut last_not_found: Option<String> = None;
        for path in candidate_paths(&self.config.upstream_path) {
            let url = join_url(base.as_str(), &path);
            tried.push(url.clone());
            let reply = match self.upstream.post_json(&url, body.clone()).await {
                Ok(reply) => reply,
                Err(e) => {
                    GATEWAY_ATTEMPTS.with_label_values(&["transport_error"]).inc();
                    error!("proxy attempt to {url} failed: {e}");
                    continue;
                }
            };
            GATEWAY_ATTEMPTS
                .with_label_values(&[reply.status.as_str()])
                .inc();
            if reply.status == StatusCode::NOT_FOUND {
                debug!("{url} answered 404, trying next candidate");
                last_not_found = Some(reply.body);
                continue;
            }
            info!("{url} answered {}", reply.status);
            return stopping_outcome(reply, tried);
        }

        warn!("no upstream candidate answered, tried {}", tried.join(", "));
        GatewayOutcome::Exhausted {
            details: last_not_found.unwrap_or_else(|| NO_REACHABLE_ENDPOINT.to_string()),
            tried,
        }
    }
}

fn stopping_outcome(reply: UpstreamReply, tried: Vec<String>) -> GatewayOutcome {
    let parsed = serde_json::from_str::<Value>(&reply.body).ok();
    if reply.status.is_success() {
        let body = match parsed {
            Some(value) => UpstreamBody::Json(value),
            None => UpstreamBody::Text {
                content_type: reply
                    .content_type
                    .unwrap_or_else(|| "application/json".to_string()),
                text: reply.body,
            },
        };
        return GatewayOutcome::Success {
            status: reply.status,
            body,
        };
    }
    match parsed {
        Some(value) => GatewayOutcome::UpstreamError {
            status: reply.status,
            error: "Upstream error".to_string(),
            upstream: Some(value),
            tried,
        },
        None => GatewayOutcome::UpstreamError {
            status: reply.status,
            error: if reply.body.is_empty() {
                reply
                    .status
                    .canonical_reason()
                    .unwrap_or_default()
                    .to_string()
            } else {
                reply.body
            },
            upstream: None,
            tried,
        },
    }
}
