use std::path::PathBuf;
use std::time::Duration;

use tender_core::{
    ArtifactUpdate, BatchProgress, Deferred, Effect, ErrorKind, Freshness, Msg, ProgressDetail,
    ProgressEvent, RegionState, RegionUpdate, ResultSnapshot, SearchError, SearchMode,
    SearchRequest, SortOrder, Stage,
};
use tender_engine::{
    ApiError, ArtifactField, ArtifactStatus, ChannelEvent, EngineCommand, EngineEvent,
    EngineHandle, EngineSettings, FailureKind, PollStatus, SearchPayload, SearchResponse,
    StatusEvent, StatusSnapshot,
};
use tender_logging::{tender_debug, tender_warn};

use super::persistence;

/// Executes core effects against the engine and turns engine events back into messages.
pub struct EffectRunner {
    engine: EngineHandle,
    state_dir: PathBuf,
    sign_in_required: bool,
}

impl EffectRunner {
    pub fn new(settings: EngineSettings, state_dir: PathBuf) -> Result<Self, ApiError> {
        Ok(Self {
            engine: EngineHandle::new(settings)?,
            state_dir,
            sign_in_required: false,
        })
    }

    pub fn sign_in_required(&self) -> bool {
        self.sign_in_required
    }

    pub fn run(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            tender_debug!("effect {}", effect_name(&effect));
            match effect {
                Effect::PersistSession(snapshot) => {
                    persistence::save_session(&self.state_dir, &snapshot);
                }
                Effect::RedirectToSignIn => {
                    tender_warn!("session expired; sign-in required");
                    self.sign_in_required = true;
                }
                other => {
                    if let Some(command) = to_command(other) {
                        self.engine.send(command);
                    }
                }
            }
        }
    }

    /// Waits up to `timeout` for the next engine event.
    pub fn next_msg(&self, timeout: Duration) -> Option<Msg> {
        self.engine.recv_timeout(timeout).map(map_event)
    }
}

fn effect_name(effect: &Effect) -> &'static str {
    match effect {
        Effect::DispatchSearch { .. } => "dispatch_search",
        Effect::OpenChannel { .. } => "open_channel",
        Effect::CloseChannel { .. } => "close_channel",
        Effect::StartPolling { .. } => "start_polling",
        Effect::StopPolling { .. } => "stop_polling",
        Effect::StartProgressTimer { .. } => "start_progress_timer",
        Effect::StopProgressTimer { .. } => "stop_progress_timer",
        Effect::AbortRequest { .. } => "abort_request",
        Effect::NotifyCancel { .. } => "notify_cancel",
        Effect::StartCountdown { .. } => "start_countdown",
        Effect::StopCountdown => "stop_countdown",
        Effect::FetchLiveResults { .. } => "fetch_live_results",
        Effect::PersistSession(_) => "persist_session",
        Effect::RedirectToSignIn => "redirect_to_sign_in",
    }
}

pub(crate) fn to_command(effect: Effect) -> Option<EngineCommand> {
    let command = match effect {
        Effect::DispatchSearch {
            attempt,
            search_id,
            request,
            force_fresh,
        } => EngineCommand::Submit {
            attempt,
            payload: to_payload(search_id, &request, force_fresh),
        },
        Effect::OpenChannel { attempt, search_id } => {
            EngineCommand::OpenChannel { attempt, search_id }
        }
        Effect::CloseChannel { attempt } => EngineCommand::CloseChannel { attempt },
        Effect::StartPolling { attempt, search_id } => {
            EngineCommand::StartPolling { attempt, search_id }
        }
        Effect::StopPolling { attempt } => EngineCommand::StopPolling { attempt },
        Effect::StartProgressTimer { attempt } => EngineCommand::StartProgressTimer { attempt },
        Effect::StopProgressTimer { attempt } => EngineCommand::StopProgressTimer { attempt },
        Effect::AbortRequest { attempt } => EngineCommand::Abort { attempt },
        Effect::NotifyCancel { search_id } => EngineCommand::NotifyCancel { search_id },
        // The remaining seconds live in core state; the engine only ticks.
        Effect::StartCountdown { attempt, .. } => EngineCommand::StartCountdown { attempt },
        Effect::StopCountdown => EngineCommand::StopCountdown,
        Effect::FetchLiveResults { attempt, search_id } => {
            EngineCommand::FetchLiveResults { attempt, search_id }
        }
        Effect::PersistSession(_) | Effect::RedirectToSignIn => return None,
    };
    Some(command)
}

pub(crate) fn to_payload(search_id: String, request: &SearchRequest, force_fresh: bool) -> SearchPayload {
    SearchPayload {
        search_id,
        regions: request.regions.clone(),
        date_from: request.date_from.format("%Y-%m-%d").to_string(),
        date_to: request.date_to.format("%Y-%m-%d").to_string(),
        mode: match request.mode {
            SearchMode::Sector => "sector",
            SearchMode::Keywords => "keywords",
        }
        .to_string(),
        sector_or_keywords: request.sector_or_keywords.clone(),
        status: request.status.clone(),
        modality_codes: request.modality_codes.clone(),
        value_min: request.value_min,
        value_max: request.value_max,
        jurisdiction_levels: request.jurisdiction_levels.clone(),
        municipality_codes: request.municipality_codes.clone(),
        sort: match request.sort {
            SortOrder::Relevance => "relevance",
            SortOrder::NewestFirst => "newest_first",
            SortOrder::ClosingSoon => "closing_soon",
            SortOrder::HighestValue => "highest_value",
        }
        .to_string(),
        force_fresh,
    }
}

pub(crate) fn map_event(event: EngineEvent) -> Msg {
    match event {
        EngineEvent::SubmitRetrying {
            attempt,
            retry,
            delay,
        } => Msg::SubmitRetrying {
            attempt,
            retry,
            delay,
        },
        EngineEvent::SearchCompleted { attempt, result } => Msg::SearchCompleted {
            attempt,
            result: result.map(map_snapshot).map_err(map_error),
        },
        EngineEvent::Channel { attempt, event } => match event {
            ChannelEvent::Connected => Msg::ChannelConnected { attempt },
            ChannelEvent::Status(status) => Msg::StatusPushed {
                attempt,
                event: map_status_event(status),
            },
            ChannelEvent::RegionStatus(region) => Msg::RegionStatusChanged {
                attempt,
                update: RegionUpdate {
                    region: region.region,
                    state: map_region_state(region.status),
                    count: region.count,
                    attempt: region.attempt,
                },
            },
            ChannelEvent::BatchProgress(batch) => Msg::BatchProgressed {
                attempt,
                batch: BatchProgress {
                    batch: batch.batch,
                    total_batches: batch.total_batches,
                    regions: batch.regions,
                },
            },
            ChannelEvent::Closed => Msg::ChannelClosed { attempt },
            ChannelEvent::Disconnected => Msg::ChannelDisconnected { attempt },
        },
        EngineEvent::Polled { attempt, snapshot } => {
            let terminal = snapshot.status.is_terminal();
            Msg::StatusPolled {
                attempt,
                event: map_polled(snapshot),
                terminal,
            }
        }
        EngineEvent::ProgressTick { attempt, elapsed } => Msg::ProgressTick { attempt, elapsed },
        EngineEvent::CountdownTick { attempt } => Msg::CountdownTick { attempt },
        EngineEvent::LiveResults { attempt, result } => Msg::LiveResultsLoaded {
            attempt,
            result: result.map(map_snapshot).map_err(map_error),
        },
    }
}

fn map_stage(stage: tender_engine::Stage) -> Stage {
    match stage {
        tender_engine::Stage::Connecting => Stage::Connecting,
        tender_engine::Stage::Fetching => Stage::Fetching,
        tender_engine::Stage::Filtering => Stage::Filtering,
        tender_engine::Stage::Summarizing => Stage::Summarizing,
        tender_engine::Stage::Exporting => Stage::Exporting,
        tender_engine::Stage::Complete => Stage::Complete,
        tender_engine::Stage::Degraded => Stage::Degraded,
    }
}

fn map_region_state(status: tender_engine::RegionStatus) -> RegionState {
    match status {
        tender_engine::RegionStatus::Pending => RegionState::Pending,
        tender_engine::RegionStatus::Fetching => RegionState::Fetching,
        tender_engine::RegionStatus::Retrying => RegionState::Retrying,
        tender_engine::RegionStatus::Success => RegionState::Success,
        tender_engine::RegionStatus::Failed => RegionState::Failed,
        tender_engine::RegionStatus::Recovered => RegionState::Recovered,
    }
}

fn percent(progress: f64) -> u8 {
    if progress.is_nan() {
        return 0;
    }
    progress.clamp(0.0, 100.0).round() as u8
}

/// `None` while the artifact is still being generated.
fn map_artifact(field: ArtifactField) -> Option<ArtifactUpdate> {
    match field.status {
        ArtifactStatus::Pending => None,
        ArtifactStatus::Ready => Some(ArtifactUpdate::Ready(field.value.unwrap_or_default())),
        ArtifactStatus::Failed => Some(ArtifactUpdate::Failed),
    }
}

fn map_status_event(status: StatusEvent) -> ProgressEvent {
    let mut event = ProgressEvent::new(map_stage(status.stage), percent(status.progress), status.message);
    if let Some(detail) = status.detail {
        event.detail = ProgressDetail {
            region_index: detail.region_index,
            region_total: detail.region_total,
            degraded_reason: detail.reason,
            summary: detail.summary.and_then(map_artifact),
            export: detail.export.and_then(map_artifact),
        };
    }
    event
}

fn map_polled(snapshot: StatusSnapshot) -> ProgressEvent {
    let stage = match (snapshot.stage, snapshot.status) {
        (Some(stage), _) => map_stage(stage),
        (None, PollStatus::Complete) => Stage::Complete,
        (None, _) => Stage::Fetching,
    };
    ProgressEvent::new(stage, percent(snapshot.progress), snapshot.message)
}

pub(crate) fn map_snapshot(response: SearchResponse) -> ResultSnapshot {
    let deferred = |field: ArtifactField| match map_artifact(field) {
        None => Deferred::Pending,
        Some(update) => update.into(),
    };
    ResultSnapshot {
        raw_count: response.raw_count,
        filtered_count: response.filtered_count,
        freshness: match response.freshness {
            tender_engine::Freshness::Live => Freshness::Live,
            tender_engine::Freshness::Cached => Freshness::Cached,
            tender_engine::Freshness::Degraded => Freshness::Degraded,
            tender_engine::Freshness::Partial => Freshness::Partial,
        },
        sources: response.sources,
        summary: deferred(response.summary),
        export: deferred(response.export),
        live_fetch_in_progress: response.live_fetch_in_progress,
        cache_age_secs: response.cache_age_secs,
    }
}

/// A 4xx carrying a structured `error_code` is a rejection with a payload,
/// even when the bare status (429) would otherwise be retried.
fn classify_status(status: u16, structured: bool) -> ErrorKind {
    match ErrorKind::from_status(status) {
        ErrorKind::Transient if structured && (400..500).contains(&status) => ErrorKind::Validation,
        kind => kind,
    }
}

pub(crate) fn map_error(err: ApiError) -> SearchError {
    let mut error = match err.kind {
        FailureKind::HttpStatus(status) => {
            SearchError::new(classify_status(status, err.error_code.is_some()), err.message)
                .with_status(status)
        }
        FailureKind::Timeout => {
            SearchError::new(ErrorKind::Transient, format!("request timed out: {}", err.message))
        }
        FailureKind::Network => SearchError::new(ErrorKind::Transient, err.message),
        FailureKind::Decode => SearchError::new(ErrorKind::Unknown, err.message),
        FailureKind::Cancelled => SearchError::new(ErrorKind::Cancelled, err.message),
    };
    if let Some(code) = err.error_code {
        error = error.with_code(code);
    }
    if let Some(serde_json::Value::Object(data)) = err.data {
        for (key, value) in data {
            let value = match value {
                serde_json::Value::String(text) => text,
                other => other.to_string(),
            };
            error = error.with_data(key, value);
        }
    }
    error
}
