use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::gateway::join_url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzeConfig {
    pub base_url: Option<String>,
    pub analyze_path: String,
    pub count_path: String,
    pub timeout: Duration,
}

/// Which backend route the dashboard calls.
#[derive(Serialize, Deserialize, clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzeEndpoint {
    /// Person + audio analysis, answers with the detection object.
    #[default]
    Analyze,
    /// Per-second counts, answers with the timeline array.
    VideoCountPopulation,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AnalyzeRequest {
    pub video_url: String,
    pub metadata: Metadata,
}

impl AnalyzeRequest {
    pub fn new(video_url: impl Into<String>, lat: Option<f64>, lon: Option<f64>) -> Self {
        Self {
            video_url: video_url.into(),
            metadata: Metadata { lat, lon },
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Backend URL missing")]
    MissingBaseUrl,
    #[error("Invalid backend URL (missing protocol)")]
    InvalidBaseUrl,
    #[error("Request to backend timed out")]
    Timeout,
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error("{0}")]
    Transport(reqwest::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Transport(e)
        }
    }
}

#[async_trait]
pub trait AnalyzeBackend: Send + Sync {
    /// Sends `request` and returns the raw body of a 2xx response.
    async fn analyze(
        &self,
        endpoint: AnalyzeEndpoint,
        request: &AnalyzeRequest,
    ) -> Result<String, FetchError>;
}

pub struct AnalyzeClient {
    config: AnalyzeConfig,
    client: Client,
}

impl AnalyzeClient {
    pub fn new(config: AnalyzeConfig) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    fn url(&self, endpoint: AnalyzeEndpoint) -> Result<String, FetchError> {
        let base = self
            .config
            .base_url
            .as_deref()
            .filter(|x| !x.is_empty())
            .ok_or(FetchError::MissingBaseUrl)?;
        if !has_http_scheme(base) {
            return Err(FetchError::InvalidBaseUrl);
        }
        let path = match endpoint {
            AnalyzeEndpoint::Analyze => &self.config.analyze_path,
            AnalyzeEndpoint::VideoCountPopulation => &self.config.count_path,
        };
        Ok(join_url(base, path))
    }
}

#[async_trait]
impl AnalyzeBackend for AnalyzeClient {
    async fn analyze(
        &self,
        endpoint: AnalyzeEndpoint,
        request: &AnalyzeRequest,
    ) -> Result<String, FetchError> {
        let url = self.url(endpoint)?;
        debug!("request sent to {url}: {request:?}");
        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(FetchError::Http {
                status,
                message: http_error_message(status, &text),
            });
        }
        Ok(text)
    }
}

fn has_http_scheme(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Builds `HTTP <status> - <detail>` from a failed response, unpacking gateway error bodies.
pub fn http_error_message(status: StatusCode, body: &str) -> String {
    let detail = match serde_json::from_str::<Value>(body) {
        Ok(value) => json_error_detail(&value),
        Err(_) => body.to_string(),
    };
    if detail.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {} - {detail}", status.as_u16())
    }
}

fn json_error_detail(value: &Value) -> String {
    let Value::Object(object) = value else {
        return match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
    };
    let mut out = match object.get("error") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(error) if is_truthy(error) => error.to_string(),
        _ => value.to_string(),
    };
    match object.get("details") {
        Some(Value::String(details)) if !details.is_empty() => {
            out.push_str(&format!(" | details: {details}"));
        }
        Some(details) if is_truthy(details) => {
            out.push_str(&format!(" | details: {details}"));
        }
        _ => (),
    }
    if let Some(Value::Array(tried)) = object.get("triedPaths") {
        let tried: Vec<String> = tried
            .iter()
            .map(|x| match x {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        out.push_str(&format!(" | tried: {}", tried.join(", ")));
    }
    out
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|x| x != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
