use std::time::Duration;

use crate::progress::estimate_duration;
use crate::retry::{manual_cooldown_secs, AutoRetry, RetryPolicy};
use crate::view_model::{AppViewModel, CountdownView, ErrorView, RegionRowView};
use crate::{
    ArtifactUpdate, AttemptId, Effect, ErrorKind, RegionTracker, ResultSnapshot, SearchError,
    SearchRequest, SessionSnapshot, Stage,
};

const MAX_NOTICES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttemptState {
    #[default]
    Idle,
    Submitting,
    Active,
    /// Failed, with an automatic retry counting down.
    Retrying,
    Succeeded,
    Failed,
    Cancelled,
}

impl AttemptState {
    pub fn is_in_flight(self) -> bool {
        matches!(self, AttemptState::Submitting | AttemptState::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Closed,
    Connecting,
    Connected,
    /// Failed after its single reconnect; polling takes over.
    Disconnected,
}

impl ChannelState {
    pub fn is_open(self) -> bool {
        matches!(self, ChannelState::Connecting | ChannelState::Connected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    FallbackRestored,
    BackgroundFetch,
    PollingFallback,
    Degraded,
    ReconcileFailed,
    Restored,
}

/// Soft, non-blocking message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

/// Summary/export/degraded updates that arrived before the result did.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct BufferedDetail {
    pub(crate) summary: Option<ArtifactUpdate>,
    pub(crate) export: Option<ArtifactUpdate>,
    pub(crate) degraded: bool,
}

/// One execution of a submitted search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchAttempt {
    pub id: AttemptId,
    pub search_id: String,
    pub state: AttemptState,
    pub automatic: bool,
    pub elapsed: Duration,
    pub estimate: Duration,
    pub immediate_retries: u32,
    pub stage: Option<Stage>,
    pub message: String,
    pub authoritative_progress: u8,
    pub progress: u8,
    pub push_disconnected: bool,
    pub(crate) channel: ChannelState,
    pub(crate) polling: bool,
    pub(crate) timer_running: bool,
    pub(crate) request_in_flight: bool,
    pub(crate) live_fetch_pending: bool,
    /// Final snapshot requested to settle artifacts polling cannot deliver.
    pub(crate) artifact_refresh: bool,
    pub(crate) buffered: BufferedDetail,
}

impl SearchAttempt {
    pub(crate) fn new(id: AttemptId, search_id: String, automatic: bool, estimate: Duration) -> Self {
        Self {
            id,
            search_id,
            state: AttemptState::Submitting,
            automatic,
            elapsed: Duration::ZERO,
            estimate,
            immediate_retries: 0,
            stage: Some(Stage::Connecting),
            message: String::new(),
            authoritative_progress: 0,
            progress: 0,
            push_disconnected: false,
            channel: ChannelState::Connecting,
            polling: false,
            timer_running: true,
            request_in_flight: true,
            live_fetch_pending: false,
            artifact_refresh: false,
            buffered: BufferedDetail::default(),
        }
    }

    pub fn channel(&self) -> ChannelState {
        self.channel
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }

    pub fn live_fetch_pending(&self) -> bool {
        self.live_fetch_pending
    }

    /// Emits teardown effects for everything still running, in order:
    /// timer, polling, channel, request, then the remote notice.
    pub(crate) fn teardown(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.timer_running {
            self.timer_running = false;
            effects.push(Effect::StopProgressTimer { attempt: self.id });
        }
        if self.polling {
            self.polling = false;
            effects.push(Effect::StopPolling { attempt: self.id });
        }
        if self.channel.is_open() {
            self.channel = ChannelState::Closed;
            effects.push(Effect::CloseChannel { attempt: self.id });
        }
        effects.push(Effect::AbortRequest { attempt: self.id });
        if self.request_in_flight || self.live_fetch_pending {
            effects.push(Effect::NotifyCancel {
                search_id: self.search_id.clone(),
            });
        }
        self.request_in_flight = false;
        self.live_fetch_pending = false;
        self.artifact_refresh = false;
        effects
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub(crate) session_tag: String,
    pub(crate) next_attempt: AttemptId,
    pub(crate) policy: RetryPolicy,
    pub(crate) attempt: Option<SearchAttempt>,
    pub(crate) last_request: Option<SearchRequest>,
    pub(crate) displayed: Option<ResultSnapshot>,
    /// Attempt that produced `displayed`; `None` for a fallback or restored snapshot.
    pub(crate) displayed_from: Option<AttemptId>,
    pub(crate) last_success: Option<(SearchRequest, ResultSnapshot)>,
    pub(crate) regions: RegionTracker,
    pub(crate) auto_retry: AutoRetry,
    pub(crate) error: Option<SearchError>,
    pub(crate) notices: Vec<Notice>,
    dirty: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            session_tag: "local".to_string(),
            next_attempt: 1,
            policy: RetryPolicy::default(),
            attempt: None,
            last_request: None,
            displayed: None,
            displayed_from: None,
            last_success: None,
            regions: RegionTracker::default(),
            auto_retry: AutoRetry::default(),
            error: None,
            notices: Vec::new(),
            dirty: false,
        }
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix for correlation ids, so ids stay unique across runs.
    pub fn with_session_tag(mut self, tag: impl Into<String>) -> Self {
        self.session_tag = tag.into();
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn attempt(&self) -> Option<&SearchAttempt> {
        self.attempt.as_ref()
    }

    pub fn phase(&self) -> AttemptState {
        self.attempt
            .as_ref()
            .map(|attempt| attempt.state)
            .unwrap_or_default()
    }

    pub fn last_request(&self) -> Option<&SearchRequest> {
        self.last_request.as_ref()
    }

    pub fn displayed(&self) -> Option<&ResultSnapshot> {
        self.displayed.as_ref()
    }

    pub fn regions(&self) -> &RegionTracker {
        &self.regions
    }

    pub fn auto_retries(&self) -> u32 {
        self.auto_retry.retries
    }

    pub fn countdown_remaining(&self) -> Option<u32> {
        self.auto_retry.countdown.map(|c| c.remaining_secs)
    }

    pub fn error(&self) -> Option<&SearchError> {
        self.error.as_ref()
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    /// Data the runner persists for restore on the next start.
    pub fn session_snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            last_request: self.last_request.clone(),
            last_success: self.last_success.clone(),
        }
    }

    /// Whether nothing is running and nothing is scheduled.
    pub fn is_settled(&self) -> bool {
        match &self.attempt {
            None => true,
            Some(attempt) => {
                !attempt.state.is_in_flight()
                    && self.auto_retry.countdown.is_none()
                    && !attempt.channel.is_open()
                    && !attempt.polling
                    && !attempt.artifact_refresh
            }
        }
    }

    pub fn view(&self) -> AppViewModel {
        let attempt = self.attempt.as_ref();
        let elapsed_secs = attempt.map(|a| a.elapsed.as_secs()).unwrap_or(0);
        let estimate_secs = attempt.map(|a| a.estimate.as_secs()).unwrap_or(0);
        let regions = self
            .regions
            .iter()
            .map(|(code, entry)| RegionRowView {
                region: code.clone(),
                state: entry.state,
                count: entry.count,
            })
            .collect();
        let error = self.error.as_ref().map(|error| ErrorView {
            kind: error.kind,
            message: error.user_message(),
            status: error.status,
            search_id: error.search_id.clone(),
            manual_cooldown_secs: match error.kind {
                ErrorKind::Authentication | ErrorKind::Authorization => None,
                _ => Some(manual_cooldown_secs(error)),
            },
        });
        let countdown = self.auto_retry.countdown.map(|c| CountdownView {
            remaining_secs: c.remaining_secs,
            retry_number: self.auto_retry.retries + 1,
            max_retries: self.policy.max_auto_retries,
        });

        AppViewModel {
            phase: self.phase(),
            search_id: attempt.map(|a| a.search_id.clone()),
            stage: attempt.and_then(|a| a.stage),
            message: attempt.map(|a| a.message.clone()).unwrap_or_default(),
            progress: attempt.map(|a| a.progress).unwrap_or(0),
            elapsed_secs,
            estimate_secs,
            overtime: attempt
                .map(|a| a.state.is_in_flight() && a.elapsed > a.estimate)
                .unwrap_or(false),
            immediate_retries: attempt.map(|a| a.immediate_retries).unwrap_or(0),
            regions,
            total_found: self.regions.total_found(),
            all_regions_complete: self.regions.all_complete(),
            batch: self.regions.batch().cloned(),
            result: self.displayed.clone(),
            error,
            notices: self.notices.clone(),
            countdown,
            auto_retries: self.auto_retry.retries,
            push_disconnected: attempt.map(|a| a.push_disconnected).unwrap_or(false),
            polling: attempt.map(|a| a.polling).unwrap_or(false),
            can_refresh_to_live: self.can_refresh_to_live(),
            can_repeat: self.last_request.is_some(),
            dirty: self.dirty,
        }
    }

    /// Returns and clears the dirty flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn current_mut(&mut self, id: AttemptId) -> Option<&mut SearchAttempt> {
        match self.attempt.as_mut() {
            Some(attempt) if attempt.id == id => Some(attempt),
            _ => {
                tender_logging::tender_debug!("dropping event for abandoned attempt {}", id);
                None
            }
        }
    }

    pub(crate) fn can_refresh_to_live(&self) -> bool {
        match &self.attempt {
            Some(attempt) => {
                attempt.state == AttemptState::Succeeded
                    && attempt.live_fetch_pending
                    && self.displayed_from == Some(attempt.id)
            }
            None => false,
        }
    }

    pub(crate) fn estimate_for(request: &SearchRequest) -> Duration {
        let mut regions = request.regions.clone();
        regions.sort();
        regions.dedup();
        estimate_duration(regions.len(), request.date_range_days())
    }

    pub(crate) fn push_notice(&mut self, kind: NoticeKind, message: impl Into<String>) {
        self.notices.push(Notice {
            kind,
            message: message.into(),
        });
        if self.notices.len() > MAX_NOTICES {
            let overflow = self.notices.len() - MAX_NOTICES;
            self.notices.drain(..overflow);
        }
        self.dirty = true;
    }
}
