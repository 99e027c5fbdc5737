use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),
}

/// A fully read upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: String,
}

#[async_trait]
pub trait Upstream: Send + Sync {
    /// POSTs `body` to `url` with `Content-Type: application/json` and reads the whole reply.
    async fn post_json(&self, url: &str, body: Bytes) -> Result<UpstreamReply, UpstreamError>;
}

pub struct HttpUpstream {
    client: Client,
}

impl HttpUpstream {
    pub fn new(timeout: Option<Duration>) -> Result<Self, UpstreamError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn post_json(&self, url: &str, body: Bytes) -> Result<UpstreamReply, UpstreamError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|x| x.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;
        Ok(UpstreamReply {
            status,
            content_type,
            body,
        })
    }
}
