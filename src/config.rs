use std::{net::SocketAddr, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{analyze::AnalyzeConfig, gateway::GatewayConfig};

pub const DEFAULT_UPSTREAM_PATH: &str = "/video-count-population";

fn default_web_bind() -> SocketAddr {
    ([0, 0, 0, 0], 8080).into()
}

fn default_gateway_route() -> String {
    "/api/video-count-population".to_string()
}

fn default_upstream_path() -> String {
    DEFAULT_UPSTREAM_PATH.to_string()
}

fn default_analyze_path() -> String {
    "/analyze".to_string()
}

fn default_gateway_timeout_secs() -> u64 {
    30
}

fn default_analyze_timeout_secs() -> u64 {
    15
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Config {
    pub prometheus_bind: Option<SocketAddr>,
    #[serde(default = "default_web_bind")]
    pub web_bind: SocketAddr,
    #[serde(default = "default_gateway_route")]
    pub gateway_route: String,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prometheus_bind: None,
            web_bind: default_web_bind(),
            gateway_route: default_gateway_route(),
            upstream: UpstreamConfig::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpstreamConfig {
    // absent is allowed here, the gateway answers 500 until it is set
    pub url: Option<Url>,
    #[serde(default = "default_upstream_path")]
    pub path: String,
    #[serde(default = "default_analyze_path")]
    pub analyze_path: String,
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_analyze_timeout_secs")]
    pub analyze_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: None,
            path: default_upstream_path(),
            analyze_path: default_analyze_path(),
            timeout_secs: default_gateway_timeout_secs(),
            analyze_timeout_secs: default_analyze_timeout_secs(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid {0}: {1}")]
    InvalidEnv(&'static str, url::ParseError),
}

impl Config {
    /// Reads the YAML file at `path`. A missing file yields the defaults.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Ok(serde_yaml::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Read(path.to_path_buf(), e)),
        }
    }

    /// Applies `EAGLE_EYE_UPSTREAM_URL` and `EAGLE_EYE_UPSTREAM_PATH` on top of the file.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("EAGLE_EYE_UPSTREAM_URL").filter(|x| !x.is_empty()) {
            self.upstream.url = Some(
                url.parse()
                    .map_err(|e| ConfigError::InvalidEnv("EAGLE_EYE_UPSTREAM_URL", e))?,
            );
        }
        if let Some(path) = lookup("EAGLE_EYE_UPSTREAM_PATH").filter(|x| !x.is_empty()) {
            self.upstream.path = path;
        }
        Ok(self)
    }

    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            upstream_url: self.upstream.url.clone(),
            upstream_path: self.upstream.path.clone(),
            timeout: Some(Duration::from_secs(self.upstream.timeout_secs)),
        }
    }

    pub fn analyze(&self) -> AnalyzeConfig {
        AnalyzeConfig {
            base_url: self.upstream.url.as_ref().map(|x| x.to_string()),
            analyze_path: self.upstream.analyze_path.clone(),
            count_path: self.upstream.path.clone(),
            timeout: Duration::from_secs(self.upstream.analyze_timeout_secs),
        }
    }
}

lazy_static::lazy_static! {
    static ref CONFIG_PATH: PathBuf = {
        let var = std::env::var("EAGLE_EYE_CONFIG").unwrap_or_default();
        if var.is_empty() {
            PathBuf::from("./config.yaml")
        } else {
            PathBuf::from(var)
        }
    };
    pub static ref CONFIG: Config = Config::load(&CONFIG_PATH)
        .and_then(|config| config.apply_env(|key| std::env::var(key).ok()))
        .expect("failed to load config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_empty_yaml() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert!(config.upstream.url.is_none());
        assert_eq!(config.upstream.path, "/video-count-population");
        assert_eq!(config.upstream.analyze_path, "/analyze");
        assert_eq!(config.gateway_route, "/api/video-count-population");
        assert_eq!(config.web_bind, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn parses_upstream_section() {
        let config: Config = serde_yaml::from_str(
            r"
web_bind: 127.0.0.1:9000
upstream:
  url: http://backend.local:8000
  path: /count
  timeout_secs: 5
",
        )
        .unwrap();
        let gateway = config.gateway();
        assert_eq!(
            gateway.upstream_url.unwrap().as_str(),
            "http://backend.local:8000/"
        );
        assert_eq!(gateway.upstream_path, "/count");
        assert_eq!(gateway.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.analyze().timeout, Duration::from_secs(15));
    }

    #[test]
    fn env_overrides_file() {
        let config = Config::default()
            .apply_env(|key| match key {
                "EAGLE_EYE_UPSTREAM_URL" => Some("https://x.ngrok.app".to_string()),
                "EAGLE_EYE_UPSTREAM_PATH" => Some("/video_count_population".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            config.upstream.url.unwrap().as_str(),
            "https://x.ngrok.app/"
        );
        assert_eq!(config.upstream.path, "/video_count_population");
    }

    #[test]
    fn empty_env_is_ignored() {
        let config = Config::default()
            .apply_env(|_| Some(String::new()))
            .unwrap();
        assert!(config.upstream.url.is_none());
        assert_eq!(config.upstream.path, DEFAULT_UPSTREAM_PATH);
    }

    #[test]
    fn invalid_env_url_is_an_error() {
        let result = Config::default().apply_env(|key| {
            (key == "EAGLE_EYE_UPSTREAM_URL").then(|| "not a url".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidEnv(_, _))));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load(std::path::Path::new("./does-not-exist.yaml")).unwrap();
        assert!(config.prometheus_bind.is_none());
    }
}
