use std::collections::BTreeMap;
use std::fmt;

/// Classification driving retry and display policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 401: never retried; restorable state is persisted before redirecting.
    Authentication,
    /// 403: quota or permission; never retried, always surfaced.
    Authorization,
    /// Structured rejection carrying `error_code` and `data`.
    Validation,
    /// Timeouts, network failures, 429 and 5xx.
    Transient,
    /// The attempt was cancelled or superseded. Swallowed.
    Cancelled,
    Unknown,
}

impl ErrorKind {
    /// Classifies an HTTP status returned by the search service.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorKind::Authentication,
            403 => ErrorKind::Authorization,
            408 | 429 => ErrorKind::Transient,
            400..=499 => ErrorKind::Validation,
            500..=599 => ErrorKind::Transient,
            _ => ErrorKind::Unknown,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Authentication => write!(f, "authentication"),
            ErrorKind::Authorization => write!(f, "authorization"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
            ErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Error envelope: classification plus the diagnostic detail needed to
/// localize a message later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchError {
    pub kind: ErrorKind,
    pub search_id: Option<String>,
    pub status: Option<u16>,
    pub message: String,
    pub error_code: Option<String>,
    /// Machine-readable payload, scalar values rendered as strings.
    pub data: BTreeMap<String, String>,
}

impl SearchError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            search_id: None,
            status: None,
            message: message.into(),
            error_code: None,
            data: BTreeMap::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_search_id(mut self, search_id: impl Into<String>) -> Self {
        self.search_id = Some(search_id.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn is_timeout(&self) -> bool {
        if self.status == Some(504) || self.status == Some(408) {
            return true;
        }
        let message = self.message.to_ascii_lowercase();
        message.contains("timeout") || message.contains("timed out")
    }

    /// English message for the user-facing layer.
    pub fn user_message(&self) -> String {
        match self.kind {
            ErrorKind::Authentication => "Your session has expired. Sign in again to continue.".to_string(),
            ErrorKind::Authorization => match self.data.get("limit") {
                Some(limit) => format!("You have used all {limit} searches included in your plan."),
                None => "Your plan does not allow more searches right now.".to_string(),
            },
            ErrorKind::Validation => self.validation_message(),
            ErrorKind::Transient => {
                if self.status == Some(429) {
                    "The search service is busy. Try again in a moment.".to_string()
                } else if self.is_timeout() {
                    "The search took too long to respond.".to_string()
                } else {
                    "The search service is temporarily unavailable.".to_string()
                }
            }
            ErrorKind::Cancelled => "Search cancelled.".to_string(),
            ErrorKind::Unknown => {
                if self.message.is_empty() {
                    "Something went wrong while searching.".to_string()
                } else {
                    format!("Something went wrong while searching: {}", self.message)
                }
            }
        }
    }

    fn validation_message(&self) -> String {
        match self.error_code.as_deref() {
            Some("DATE_RANGE_EXCEEDED") => {
                match (self.data.get("requested_days"), self.data.get("max_days")) {
                    (Some(requested), Some(max)) => format!(
                        "The selected period spans {requested} days; the maximum is {max} days."
                    ),
                    (None, Some(max)) => format!("The selected period exceeds {max} days."),
                    _ => "The selected period is too long.".to_string(),
                }
            }
            Some("RATE_LIMITED") => match self.data.get("retry_after") {
                Some(secs) => format!("Too many searches. Wait {secs} seconds before trying again."),
                None => "Too many searches. Wait a moment before trying again.".to_string(),
            },
            _ if !self.message.is_empty() => self.message.clone(),
            _ => "The search parameters were rejected.".to_string(),
        }
    }
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error", self.kind)?;
        if let Some(status) = self.status {
            write!(f, " (http {status})")?;
        }
        if let Some(code) = &self.error_code {
            write!(f, " [{code}]")?;
        }
        if let Some(id) = &self.search_id {
            write!(f, " search_id={id}")?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for SearchError {}
