use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub type AttemptId = u64;

/// Body of `POST /search`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchPayload {
    pub search_id: String,
    pub regions: Vec<String>,
    /// `YYYY-MM-DD`.
    pub date_from: String,
    pub date_to: String,
    pub mode: String,
    pub sector_or_keywords: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub modality_codes: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_min: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_max: Option<u64>,
    pub jurisdiction_levels: Vec<String>,
    pub municipality_codes: Vec<String>,
    pub sort: String,
    pub force_fresh: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    #[default]
    Live,
    Cached,
    Degraded,
    Partial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    #[default]
    Pending,
    Ready,
    Failed,
}

/// Summary or export slot; may still be generated after the result arrives.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArtifactField {
    #[serde(default)]
    pub status: ArtifactStatus,
    #[serde(default)]
    pub value: Option<String>,
}

/// Body of a successful `POST /search` or `GET /search/{id}/results`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchResponse {
    pub raw_count: u64,
    pub filtered_count: u64,
    pub freshness: Freshness,
    pub sources: Vec<String>,
    pub summary: ArtifactField,
    pub export: ArtifactField,
    pub live_fetch_in_progress: bool,
    pub cache_age_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Connecting,
    Fetching,
    Filtering,
    Summarizing,
    Exporting,
    Complete,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct StatusDetail {
    pub region_index: Option<u32>,
    pub region_total: Option<u32>,
    pub reason: Option<String>,
    pub summary: Option<ArtifactField>,
    pub export: Option<ArtifactField>,
}

/// `status` event on the push channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusEvent {
    pub stage: Stage,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub detail: Option<StatusDetail>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionStatus {
    Pending,
    Fetching,
    Retrying,
    Success,
    Failed,
    Recovered,
}

/// `region_status` event on the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegionStatusEvent {
    pub region: String,
    pub status: RegionStatus,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub attempt: u32,
}

/// `batch_progress` event on the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BatchProgressEvent {
    pub batch: u32,
    pub total_batches: u32,
    #[serde(default)]
    pub regions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    Running,
    Complete,
    Failed,
    Timeout,
}

impl PollStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PollStatus::Running)
    }
}

/// Body of `GET /search/{id}/status`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusSnapshot {
    pub status: PollStatus,
    #[serde(default)]
    pub stage: Option<Stage>,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Status(StatusEvent),
    RegionStatus(RegionStatusEvent),
    BatchProgress(BatchProgressEvent),
    /// Stream finished after the search completed.
    Closed,
    /// Connection lost and the single reconnect failed too.
    Disconnected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    SubmitRetrying {
        attempt: AttemptId,
        retry: u32,
        delay: Duration,
    },
    SearchCompleted {
        attempt: AttemptId,
        result: Result<SearchResponse, ApiError>,
    },
    Channel {
        attempt: AttemptId,
        event: ChannelEvent,
    },
    Polled {
        attempt: AttemptId,
        snapshot: StatusSnapshot,
    },
    ProgressTick {
        attempt: AttemptId,
        elapsed: Duration,
    },
    CountdownTick {
        attempt: AttemptId,
    },
    LiveResults {
        attempt: AttemptId,
        result: Result<SearchResponse, ApiError>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub kind: FailureKind,
    pub message: String,
    pub error_code: Option<String>,
    pub data: Option<serde_json::Value>,
}

impl ApiError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            error_code: None,
            data: None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self.kind {
            FailureKind::HttpStatus(code) => Some(code),
            _ => None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(code) = &self.error_code {
            write!(f, " [{code}]")?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    HttpStatus(u16),
    Timeout,
    Network,
    Decode,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Decode => write!(f, "invalid response body"),
            FailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}
