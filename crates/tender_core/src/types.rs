use chrono::NaiveDate;

/// Local, monotonically increasing identifier of one search attempt.
pub type AttemptId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    #[default]
    Sector,
    Keywords,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Relevance,
    NewestFirst,
    ClosingSoon,
    HighestValue,
}

/// Snapshot of every filter parameter at submit time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub regions: Vec<String>,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub mode: SearchMode,
    pub sector_or_keywords: String,
    pub status: Option<String>,
    pub modality_codes: Vec<u32>,
    pub value_min: Option<u64>,
    pub value_max: Option<u64>,
    pub jurisdiction_levels: Vec<String>,
    pub municipality_codes: Vec<String>,
    pub sort: SortOrder,
}

impl SearchRequest {
    pub fn new(regions: Vec<String>, date_from: NaiveDate, date_to: NaiveDate) -> Self {
        Self {
            regions,
            date_from,
            date_to,
            mode: SearchMode::default(),
            sector_or_keywords: String::new(),
            status: None,
            modality_codes: Vec::new(),
            value_min: None,
            value_max: None,
            jurisdiction_levels: Vec::new(),
            municipality_codes: Vec::new(),
            sort: SortOrder::default(),
        }
    }

    /// Inclusive length of the date range in days, never less than 1.
    pub fn date_range_days(&self) -> u32 {
        let days = (self.date_to - self.date_from).num_days() + 1;
        days.clamp(1, i64::from(u32::MAX)) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Freshness {
    #[default]
    Live,
    Cached,
    Degraded,
    Partial,
}

/// A result field that may arrive after the snapshot is first shown.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Deferred {
    #[default]
    Pending,
    Ready(String),
    Failed,
}

impl Deferred {
    pub fn is_pending(&self) -> bool {
        matches!(self, Deferred::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResultSnapshot {
    pub raw_count: u64,
    pub filtered_count: u64,
    pub freshness: Freshness,
    pub sources: Vec<String>,
    /// Executive summary text once ready.
    pub summary: Deferred,
    /// Export artifact reference once ready.
    pub export: Deferred,
    pub live_fetch_in_progress: bool,
    pub cache_age_secs: Option<u64>,
}

impl ResultSnapshot {
    /// A snapshot with at least one item is worth falling back to.
    pub fn is_usable(&self) -> bool {
        self.filtered_count > 0
    }

    pub fn artifacts_settled(&self) -> bool {
        !self.summary.is_pending() && !self.export.is_pending()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connecting,
    Fetching,
    Filtering,
    Summarizing,
    Exporting,
    Complete,
    Degraded,
}

/// Readiness change for the summary or export field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactUpdate {
    Ready(String),
    Failed,
}

impl From<ArtifactUpdate> for Deferred {
    fn from(update: ArtifactUpdate) -> Self {
        match update {
            ArtifactUpdate::Ready(value) => Deferred::Ready(value),
            ArtifactUpdate::Failed => Deferred::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgressDetail {
    pub region_index: Option<u32>,
    pub region_total: Option<u32>,
    pub degraded_reason: Option<String>,
    pub summary: Option<ArtifactUpdate>,
    pub export: Option<ArtifactUpdate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub stage: Stage,
    /// 0..=100; larger values are clamped on apply.
    pub progress: u8,
    pub message: String,
    pub detail: ProgressDetail,
}

impl ProgressEvent {
    pub fn new(stage: Stage, progress: u8, message: impl Into<String>) -> Self {
        Self {
            stage,
            progress,
            message: message.into(),
            detail: ProgressDetail::default(),
        }
    }
}

/// Persisted data restorable on the next start.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub last_request: Option<SearchRequest>,
    pub last_success: Option<(SearchRequest, ResultSnapshot)>,
}
