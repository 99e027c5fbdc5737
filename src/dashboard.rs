use chrono::{DateTime, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::{
    analyze::{AnalyzeBackend, AnalyzeEndpoint, AnalyzeRequest, FetchError},
    normalize::{normalize_body, AudioEvent, NormalizeError, Normalized, TimelineEntry},
};

pub const DRONE_CCTV_ID: &str = "DRONE";
pub const DRONE_LOCATION_NAME: &str = "Drone Detection";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct MapPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TargetLocation {
    pub cctv_id: String,
    pub location_name: String,
    pub coordinates: MapPoint,
    pub timestamp: DateTime<Utc>,
}

/// What a failed refresh wipes. Target locations are never touched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureScope {
    /// The request was never sent, or the body had no known shape.
    Timeline,
    /// The body was not JSON. Audio from the last detection stays.
    Detection,
    /// The request failed in flight or came back non-2xx.
    Analysis,
}

impl From<&FetchError> for FailureScope {
    fn from(e: &FetchError) -> Self {
        match e {
            FetchError::MissingBaseUrl | FetchError::InvalidBaseUrl => FailureScope::Timeline,
            _ => FailureScope::Analysis,
        }
    }
}

impl From<NormalizeError> for FailureScope {
    fn from(e: NormalizeError) -> Self {
        match e {
            NormalizeError::NonJson => FailureScope::Detection,
            NormalizeError::UnrecognizedShape => FailureScope::Timeline,
        }
    }
}

/// State behind one dashboard page.
#[derive(Default)]
pub struct DashboardSession {
    loading: bool,
    timeline: Vec<TimelineEntry>,
    person_found: Option<bool>,
    audio: Vec<AudioEvent>,
    targets: Vec<TargetLocation>,
    error: Option<String>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct DashboardSnapshot {
    pub loading: bool,
    pub timeline: Vec<TimelineEntry>,
    pub person_found: Option<bool>,
    pub audio: Vec<AudioEvent>,
    pub targets: Vec<TargetLocation>,
    pub latest_detection: Option<TargetLocation>,
    pub total_count: u64,
    pub peak_count: u32,
    pub error: Option<String>,
}

impl DashboardSession {
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Runs one analyze round trip. The loading flag is cleared on every exit path,
    /// including when the returned future is dropped mid-request.
    pub async fn refresh(
        &mut self,
        backend: &dyn AnalyzeBackend,
        endpoint: AnalyzeEndpoint,
        request: &AnalyzeRequest,
    ) {
        self.error = None;
        self.loading = true;
        let result = {
            defer_lite::defer! {
                self.loading = false;
            }
            backend.analyze(endpoint, request).await
        };

        match result {
            Ok(raw) => self.apply(normalize_body(&raw), Utc::now()),
            Err(e) => {
                error!("error fetching timeline: {e}");
                self.fail(e.to_string(), FailureScope::from(&e));
            }
        }
    }

    pub fn apply(&mut self, normalized: Normalized, now: DateTime<Utc>) {
        if let Some(e) = normalized.error {
            self.fail(e.to_string(), e.into());
            return;
        }
        self.timeline = normalized.timeline;
        // timeline shape leaves the detection state alone
        let Some(detected) = normalized.detected else {
            return;
        };
        self.person_found = Some(detected);
        self.audio = normalized.audio;
        if let Some(detection) = normalized.detection {
            let coordinates = detection.coordinates;
            info!(
                "target found at {:.4}, {:.4}",
                coordinates.lat, coordinates.lon
            );
            self.targets.push(TargetLocation {
                cctv_id: DRONE_CCTV_ID.to_string(),
                location_name: DRONE_LOCATION_NAME.to_string(),
                coordinates: MapPoint {
                    lat: coordinates.lat,
                    lng: coordinates.lon,
                },
                timestamp: now,
            });
        }
    }

    pub fn fail(&mut self, message: String, scope: FailureScope) {
        self.timeline.clear();
        if scope != FailureScope::Timeline {
            self.person_found = None;
        }
        if scope == FailureScope::Analysis {
            self.audio.clear();
        }
        self.error = Some(message);
    }

    pub fn reset(&mut self) {
        self.timeline.clear();
        self.person_found = None;
        self.audio.clear();
        self.targets.clear();
        self.error = None;
    }

    pub fn total_count(&self) -> u64 {
        self.timeline.iter().map(|x| x.count as u64).sum()
    }

    pub fn peak_count(&self) -> u32 {
        self.timeline.iter().map(|x| x.count).max().unwrap_or(0)
    }

    pub fn latest_detection(&self) -> Option<&TargetLocation> {
        // last pushed wins a timestamp tie
        self.targets.iter().max_by_key(|x| x.timestamp)
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            loading: self.is_loading(),
            timeline: self.timeline.clone(),
            person_found: self.person_found,
            audio: self.audio.clone(),
            targets: self.targets.clone(),
            latest_detection: self.latest_detection().cloned(),
            total_count: self.total_count(),
            peak_count: self.peak_count(),
            error: self.error.clone(),
        }
    }
}

/// Formats a video offset as `m:ss min`.
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!("{}:{:02} min", total / 60, total % 60)
}
