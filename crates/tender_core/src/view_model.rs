use crate::{AttemptState, BatchProgress, ErrorKind, Notice, RegionState, ResultSnapshot, Stage};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppViewModel {
    pub phase: AttemptState,
    pub search_id: Option<String>,
    pub stage: Option<Stage>,
    pub message: String,
    /// Effective progress, 0..=100, never regressing within an attempt.
    pub progress: u8,
    pub elapsed_secs: u64,
    pub estimate_secs: u64,
    /// Still running past the estimate.
    pub overtime: bool,
    pub immediate_retries: u32,
    pub regions: Vec<RegionRowView>,
    pub total_found: u64,
    pub all_regions_complete: bool,
    pub batch: Option<BatchProgress>,
    pub result: Option<ResultSnapshot>,
    /// Hard error panel. `None` when a fallback snapshot is shown instead.
    pub error: Option<ErrorView>,
    pub notices: Vec<Notice>,
    pub countdown: Option<CountdownView>,
    pub auto_retries: u32,
    pub push_disconnected: bool,
    pub polling: bool,
    pub can_refresh_to_live: bool,
    pub can_repeat: bool,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionRowView {
    pub region: String,
    pub state: RegionState,
    pub count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorView {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub search_id: Option<String>,
    /// Cooldown for the manual "try again" button.
    pub manual_cooldown_secs: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownView {
    pub remaining_secs: u32,
    /// 1-based number of the retry that fires when the countdown ends.
    pub retry_number: u32,
    pub max_retries: u32,
}
