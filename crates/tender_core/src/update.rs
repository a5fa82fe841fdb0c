use std::time::Duration;

use tender_logging::{tender_debug, tender_info, tender_warn};

use crate::progress::{effective_progress, simulated_progress};
use crate::retry::{Countdown, RetryPlan};
use crate::state::{AttemptState, ChannelState, NoticeKind, SearchAttempt};
use crate::{
    AppState, AttemptId, Deferred, Effect, ErrorKind, Freshness, Msg, ProgressEvent,
    ResultSnapshot, SearchError, SearchRequest, SessionSnapshot, Stage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Push,
    Poll { terminal: bool },
}

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::SubmitClicked {
            request,
            force_fresh,
        } => submit(&mut state, request, force_fresh, false),
        Msg::RefreshClicked => match state.last_request.clone() {
            Some(request) => submit(&mut state, request, false, false),
            None => Vec::new(),
        },
        Msg::CancelClicked => cancel(&mut state),
        Msg::RetryNowClicked => match state.auto_retry.countdown {
            Some(_) => fire_auto_retry(&mut state),
            None => Vec::new(),
        },
        Msg::CancelRetryClicked => cancel_retry(&mut state),
        Msg::RefreshToLiveClicked => refresh_to_live(&mut state),
        Msg::RestoreSession(snapshot) => {
            restore_session(&mut state, snapshot);
            Vec::new()
        }
        Msg::SubmitRetrying {
            attempt,
            retry,
            delay,
        } => {
            if let Some(current) = state.current_mut(attempt) {
                current.immediate_retries = retry;
                current.message = format!(
                    "Search service busy, retrying in {}s (retry {})",
                    delay.as_secs(),
                    retry
                );
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::SearchCompleted { attempt, result } => match result {
            Ok(snapshot) => search_succeeded(&mut state, attempt, snapshot),
            Err(error) => search_failed(&mut state, attempt, error),
        },
        Msg::ChannelConnected { attempt } => channel_connected(&mut state, attempt),
        Msg::ChannelDisconnected { attempt } => channel_disconnected(&mut state, attempt),
        Msg::ChannelClosed { attempt } => {
            if let Some(current) = state.current_mut(attempt) {
                if current.channel.is_open() {
                    current.channel = ChannelState::Closed;
                    state.mark_dirty();
                }
            }
            Vec::new()
        }
        Msg::StatusPushed { attempt, event } => apply_status(&mut state, attempt, event, Source::Push),
        Msg::StatusPolled {
            attempt,
            event,
            terminal,
        } => apply_status(&mut state, attempt, event, Source::Poll { terminal }),
        Msg::RegionStatusChanged { attempt, update } => {
            if state.current_mut(attempt).is_some() && state.regions.apply(update) {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::BatchProgressed { attempt, batch } => {
            if state.current_mut(attempt).is_some() && state.regions.set_batch(batch) {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::ProgressTick { attempt, elapsed } => {
            progress_tick(&mut state, attempt, elapsed);
            Vec::new()
        }
        Msg::CountdownTick { attempt } => countdown_tick(&mut state, attempt),
        Msg::LiveResultsLoaded { attempt, result } => live_results_loaded(&mut state, attempt, result),
        Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

/// Supersedes any current attempt and starts a new one.
///
/// `automatic` submits come from the retry countdown and keep the
/// automatic-retry count; user submits reset it.
fn submit(
    state: &mut AppState,
    request: SearchRequest,
    force_fresh: bool,
    automatic: bool,
) -> Vec<Effect> {
    let mut effects = Vec::new();
    if state.auto_retry.countdown.take().is_some() {
        effects.push(Effect::StopCountdown);
    }
    if let Some(previous) = state.attempt.as_mut() {
        effects.extend(previous.teardown());
        if previous.state.is_in_flight() {
            previous.state = AttemptState::Cancelled;
        }
    }
    if !automatic {
        state.auto_retry.reset();
    }

    let id = state.next_attempt;
    state.next_attempt += 1;
    let search_id = format!("{}-{}", state.session_tag, id);
    let estimate = AppState::estimate_for(&request);

    state.regions.seed(&request.regions);
    state.last_request = Some(request.clone());
    state.displayed = None;
    state.displayed_from = None;
    state.error = None;
    state.attempt = Some(SearchAttempt::new(id, search_id.clone(), automatic, estimate));
    state.mark_dirty();

    tender_info!(
        "submit attempt={} search_id={} regions={} days={} automatic={} force_fresh={}",
        id,
        search_id,
        state.regions.len(),
        request.date_range_days(),
        automatic,
        force_fresh
    );

    effects.push(Effect::PersistSession(state.session_snapshot()));
    effects.push(Effect::DispatchSearch {
        attempt: id,
        search_id: search_id.clone(),
        request,
        force_fresh,
    });
    effects.push(Effect::OpenChannel {
        attempt: id,
        search_id,
    });
    effects.push(Effect::StartProgressTimer { attempt: id });
    effects
}

fn cancel(state: &mut AppState) -> Vec<Effect> {
    let mut effects = Vec::new();
    if state.auto_retry.countdown.take().is_some() {
        effects.push(Effect::StopCountdown);
    }
    let Some(attempt) = state.attempt.as_mut() else {
        return effects;
    };
    match attempt.state {
        AttemptState::Submitting | AttemptState::Active | AttemptState::Retrying => {
            tender_info!("cancel attempt={} search_id={}", attempt.id, attempt.search_id);
            effects.extend(attempt.teardown());
            attempt.state = AttemptState::Cancelled;
        }
        AttemptState::Succeeded
            if attempt.channel.is_open()
                || attempt.live_fetch_pending
                || attempt.artifact_refresh =>
        {
            // Abandons the background work but keeps the result on screen.
            effects.extend(attempt.teardown());
        }
        _ => return effects,
    }
    if state.displayed.is_none() {
        state.displayed = state
            .last_success
            .as_ref()
            .filter(|(_, snapshot)| snapshot.is_usable())
            .map(|(_, snapshot)| snapshot.clone());
        state.displayed_from = None;
    }
    state.error = None;
    state.mark_dirty();
    effects
}

fn fire_auto_retry(state: &mut AppState) -> Vec<Effect> {
    let Some(request) = state.last_request.clone() else {
        state.auto_retry.countdown = None;
        return vec![Effect::StopCountdown];
    };
    state.auto_retry.retries += 1;
    tender_info!(
        "automatic retry {} of {}",
        state.auto_retry.retries,
        state.policy.max_auto_retries
    );
    submit(state, request, false, true)
}

fn cancel_retry(state: &mut AppState) -> Vec<Effect> {
    if state.auto_retry.countdown.take().is_none() {
        return Vec::new();
    }
    if let Some(attempt) = state.attempt.as_mut() {
        if attempt.state == AttemptState::Retrying {
            attempt.state = AttemptState::Failed;
        }
    }
    state.mark_dirty();
    vec![Effect::StopCountdown]
}

fn countdown_tick(state: &mut AppState, attempt: AttemptId) -> Vec<Effect> {
    let Some(countdown) = state.auto_retry.countdown.as_mut() else {
        return Vec::new();
    };
    if countdown.attempt != attempt {
        tender_debug!("dropping countdown tick for attempt {}", attempt);
        return Vec::new();
    }
    countdown.remaining_secs = countdown.remaining_secs.saturating_sub(1);
    if countdown.remaining_secs == 0 {
        return fire_auto_retry(state);
    }
    state.mark_dirty();
    Vec::new()
}

fn search_succeeded(state: &mut AppState, id: AttemptId, mut snapshot: ResultSnapshot) -> Vec<Effect> {
    let Some(attempt) = state.current_mut(id) else {
        return Vec::new();
    };
    if !attempt.state.is_in_flight() {
        return Vec::new();
    }
    let mut effects = Vec::new();
    attempt.state = AttemptState::Succeeded;
    attempt.request_in_flight = false;
    attempt.progress = 100;
    if !snapshot.live_fetch_in_progress {
        attempt.stage = Some(Stage::Complete);
    }
    if attempt.timer_running {
        attempt.timer_running = false;
        effects.push(Effect::StopProgressTimer { attempt: id });
    }

    let buffered = std::mem::take(&mut attempt.buffered);
    if let Some(summary) = buffered.summary {
        snapshot.summary = summary.into();
    }
    if let Some(export) = buffered.export {
        snapshot.export = export.into();
    }
    if buffered.degraded {
        snapshot.freshness = Freshness::Degraded;
    }
    attempt.live_fetch_pending = snapshot.live_fetch_in_progress;
    let search_id = attempt.search_id.clone();

    tender_info!(
        "attempt={} search_id={} succeeded raw={} filtered={} freshness={:?} live_fetch={}",
        id,
        search_id,
        snapshot.raw_count,
        snapshot.filtered_count,
        snapshot.freshness,
        snapshot.live_fetch_in_progress
    );

    if snapshot.live_fetch_in_progress {
        state.push_notice(
            NoticeKind::BackgroundFetch,
            "Showing cached results while a live search finishes in the background.",
        );
    }
    // Latest success wins even when empty; emptiness only matters for fallback.
    if let Some(request) = state.last_request.clone() {
        state.last_success = Some((request, snapshot.clone()));
    }
    state.error = None;
    state.displayed = Some(snapshot);
    state.displayed_from = Some(id);
    state.mark_dirty();

    effects.push(Effect::PersistSession(state.session_snapshot()));
    effects.extend(close_channel_if_settled(state));
    effects
}

fn search_failed(state: &mut AppState, id: AttemptId, mut error: SearchError) -> Vec<Effect> {
    if error.kind == ErrorKind::Cancelled {
        tender_debug!("attempt {} cancelled: {}", id, error.message);
        return Vec::new();
    }
    let last_success_usable = state
        .last_success
        .as_ref()
        .is_some_and(|(_, snapshot)| snapshot.is_usable());
    let plan = RetryPlan::for_error(&error, &state.policy);
    let can_auto_retry = state.auto_retry.can_retry(&plan);
    let cooldown = state.policy.cooldown_for(state.auto_retry.retries);

    let Some(attempt) = state.current_mut(id) else {
        return Vec::new();
    };
    if !attempt.state.is_in_flight() {
        return Vec::new();
    }
    if error.search_id.is_none() {
        error.search_id = Some(attempt.search_id.clone());
    }
    tender_warn!("attempt={} failed: {}", id, error);

    // The request is over; release everything except the remote notice.
    attempt.request_in_flight = false;
    let mut effects = Vec::new();
    if attempt.timer_running {
        attempt.timer_running = false;
        effects.push(Effect::StopProgressTimer { attempt: id });
    }
    if attempt.polling {
        attempt.polling = false;
        effects.push(Effect::StopPolling { attempt: id });
    }
    if attempt.channel.is_open() {
        attempt.channel = ChannelState::Closed;
        effects.push(Effect::CloseChannel { attempt: id });
    }
    attempt.state = AttemptState::Failed;

    match error.kind {
        ErrorKind::Authentication => {
            effects.push(Effect::PersistSession(state.session_snapshot()));
            effects.push(Effect::RedirectToSignIn);
            state.error = Some(error);
        }
        ErrorKind::Authorization => {
            state.error = Some(error);
        }
        _ if last_success_usable => {
            state.displayed = state.last_success.as_ref().map(|(_, s)| s.clone());
            state.displayed_from = None;
            state.error = None;
            let message = format!(
                "Showing your previous results. {}",
                error.user_message()
            );
            state.push_notice(NoticeKind::FallbackRestored, message);
        }
        _ if can_auto_retry => {
            if let Some(attempt) = state.attempt.as_mut() {
                attempt.state = AttemptState::Retrying;
            }
            state.auto_retry.countdown = Some(Countdown {
                attempt: id,
                remaining_secs: cooldown,
            });
            tender_info!(
                "scheduling automatic retry {} in {}s",
                state.auto_retry.retries + 1,
                cooldown
            );
            effects.push(Effect::StartCountdown {
                attempt: id,
                seconds: cooldown,
            });
            state.error = Some(error);
        }
        _ => {
            state.error = Some(error);
        }
    }
    state.mark_dirty();
    effects
}

fn channel_connected(state: &mut AppState, id: AttemptId) -> Vec<Effect> {
    let Some(attempt) = state.current_mut(id) else {
        return Vec::new();
    };
    let mut effects = Vec::new();
    if attempt.channel == ChannelState::Disconnected && attempt.polling {
        attempt.polling = false;
        effects.push(Effect::StopPolling { attempt: id });
    }
    attempt.channel = ChannelState::Connected;
    attempt.push_disconnected = false;
    if attempt.state == AttemptState::Submitting {
        attempt.state = AttemptState::Active;
    }
    state.mark_dirty();
    effects
}

fn channel_disconnected(state: &mut AppState, id: AttemptId) -> Vec<Effect> {
    let awaiting_artifacts = state.displayed_from == Some(id)
        && state
            .displayed
            .as_ref()
            .is_some_and(|snapshot| !snapshot.artifacts_settled());
    let Some(attempt) = state.current_mut(id) else {
        return Vec::new();
    };
    if attempt.channel == ChannelState::Disconnected {
        return Vec::new();
    }
    attempt.channel = ChannelState::Disconnected;
    attempt.push_disconnected = true;
    let mut effects = Vec::new();
    let wants_status = attempt.state.is_in_flight()
        || (attempt.state == AttemptState::Succeeded
            && (awaiting_artifacts || attempt.live_fetch_pending));
    let start_polling = wants_status && !attempt.polling;
    if start_polling {
        attempt.polling = true;
        effects.push(Effect::StartPolling {
            attempt: id,
            search_id: attempt.search_id.clone(),
        });
    }
    tender_warn!("push channel lost for attempt={} polling={}", id, start_polling);
    if start_polling {
        state.push_notice(
            NoticeKind::PollingFallback,
            "Live progress is unavailable; checking status periodically.",
        );
    }
    state.mark_dirty();
    effects
}

fn apply_status(
    state: &mut AppState,
    id: AttemptId,
    event: ProgressEvent,
    source: Source,
) -> Vec<Effect> {
    let displaying_attempt = state.displayed_from == Some(id);
    let Some(attempt) = state.current_mut(id) else {
        return Vec::new();
    };
    let mut effects = Vec::new();
    let polling_finished = matches!(source, Source::Poll { terminal: true });
    match source {
        Source::Poll { terminal } => {
            if terminal && attempt.polling {
                attempt.polling = false;
            }
            if attempt.channel != ChannelState::Disconnected {
                tender_debug!("push channel has priority; dropping polled status");
                return effects;
            }
        }
        Source::Push => {
            if attempt.channel == ChannelState::Disconnected {
                attempt.push_disconnected = false;
                if attempt.polling {
                    attempt.polling = false;
                    effects.push(Effect::StopPolling { attempt: id });
                }
            }
            attempt.channel = ChannelState::Connected;
        }
    }
    if attempt.state == AttemptState::Submitting {
        attempt.state = AttemptState::Active;
    }

    let authoritative = event.progress.min(100);
    if attempt.state.is_in_flight() {
        attempt.stage = Some(event.stage);
        if !event.message.is_empty() {
            attempt.message = event.message.clone();
        }
        attempt.authoritative_progress = authoritative;
        attempt.progress = effective_progress(attempt.progress, authoritative, 0);
    }
    if event.stage == Stage::Complete {
        attempt.progress = 100;
    }

    let detail = event.detail;
    let degraded_reason = if event.stage == Stage::Degraded || detail.degraded_reason.is_some() {
        Some(
            detail
                .degraded_reason
                .clone()
                .unwrap_or_else(|| "some sources did not respond".to_string()),
        )
    } else {
        None
    };
    if !displaying_attempt {
        if let Some(summary) = detail.summary.clone() {
            attempt.buffered.summary = Some(summary);
        }
        if let Some(export) = detail.export.clone() {
            attempt.buffered.export = Some(export);
        }
        if degraded_reason.is_some() {
            attempt.buffered.degraded = true;
        }
    }
    let is_new_degradation = degraded_reason.is_some()
        && !state
            .notices
            .last()
            .is_some_and(|notice| notice.kind == NoticeKind::Degraded);

    if displaying_attempt {
        if let Some(snapshot) = state.displayed.as_mut() {
            if let Some(summary) = detail.summary {
                snapshot.summary = summary.into();
            }
            if let Some(export) = detail.export {
                snapshot.export = export.into();
            }
            if degraded_reason.is_some() {
                snapshot.freshness = Freshness::Degraded;
            }
        }
    }
    if let (Some(reason), true) = (degraded_reason, is_new_degradation) {
        state.push_notice(NoticeKind::Degraded, format!("Results may be incomplete: {reason}."));
    }
    if polling_finished {
        effects.extend(request_artifact_refresh(state, id));
    }
    state.mark_dirty();
    effects.extend(close_channel_if_settled(state));
    effects
}

/// Polled status carries no summary/export, so once polling ends after
/// success the finished snapshot is fetched to settle them.
fn request_artifact_refresh(state: &mut AppState, id: AttemptId) -> Vec<Effect> {
    let awaiting_artifacts = state.displayed_from == Some(id)
        && state
            .displayed
            .as_ref()
            .is_some_and(|snapshot| !snapshot.artifacts_settled());
    let Some(attempt) = state.current_mut(id) else {
        return Vec::new();
    };
    if !awaiting_artifacts
        || attempt.state != AttemptState::Succeeded
        || attempt.live_fetch_pending
        || attempt.artifact_refresh
    {
        return Vec::new();
    }
    tender_info!("polling finished with pending artifacts; fetching final snapshot");
    attempt.artifact_refresh = true;
    vec![Effect::FetchLiveResults {
        attempt: id,
        search_id: attempt.search_id.clone(),
    }]
}

/// Applies the snapshot fetched by [`request_artifact_refresh`]. Artifacts it
/// still lacks are marked failed since nothing else will deliver them.
fn artifact_refresh_loaded(
    state: &mut AppState,
    id: AttemptId,
    result: Result<ResultSnapshot, SearchError>,
) -> Vec<Effect> {
    if let Some(attempt) = state.current_mut(id) {
        attempt.artifact_refresh = false;
    }
    let fetched = match result {
        Ok(snapshot) => Some(snapshot),
        Err(error) if error.kind == ErrorKind::Cancelled => return Vec::new(),
        Err(error) => {
            tender_warn!("final snapshot fetch failed: {}", error);
            None
        }
    };
    let Some(displayed) = state.displayed.as_mut() else {
        return Vec::new();
    };
    if let Some(fetched) = fetched {
        if displayed.summary.is_pending() {
            displayed.summary = fetched.summary;
        }
        if displayed.export.is_pending() {
            displayed.export = fetched.export;
        }
    }
    for artifact in [&mut displayed.summary, &mut displayed.export] {
        if artifact.is_pending() {
            *artifact = Deferred::Failed;
        }
    }
    let settled = displayed.clone();
    if let Some(request) = state.last_request.clone() {
        state.last_success = Some((request, settled));
    }
    state.mark_dirty();
    let mut effects = vec![Effect::PersistSession(state.session_snapshot())];
    effects.extend(close_channel_if_settled(state));
    effects
}

/// After success, closes the channel once nothing more can arrive on it.
fn close_channel_if_settled(state: &mut AppState) -> Vec<Effect> {
    let settled = state
        .displayed
        .as_ref()
        .is_some_and(ResultSnapshot::artifacts_settled);
    let displayed_from = state.displayed_from;
    let Some(attempt) = state.attempt.as_mut() else {
        return Vec::new();
    };
    if attempt.state != AttemptState::Succeeded
        || attempt.live_fetch_pending
        || displayed_from != Some(attempt.id)
        || !settled
    {
        return Vec::new();
    }
    let mut effects = Vec::new();
    if attempt.polling {
        attempt.polling = false;
        effects.push(Effect::StopPolling { attempt: attempt.id });
    }
    if attempt.channel.is_open() {
        attempt.channel = ChannelState::Closed;
        effects.push(Effect::CloseChannel { attempt: attempt.id });
    }
    effects
}

fn progress_tick(state: &mut AppState, id: AttemptId, elapsed: Duration) {
    let Some(attempt) = state.current_mut(id) else {
        return;
    };
    if !attempt.state.is_in_flight() {
        return;
    }
    let previous_secs = attempt.elapsed.as_secs();
    let previous_progress = attempt.progress;
    attempt.elapsed = elapsed;
    let simulated = simulated_progress(elapsed, attempt.estimate);
    attempt.progress = effective_progress(
        attempt.progress,
        attempt.authoritative_progress,
        simulated,
    );
    if attempt.progress != previous_progress || elapsed.as_secs() != previous_secs {
        state.mark_dirty();
    }
}

fn refresh_to_live(state: &mut AppState) -> Vec<Effect> {
    if !state.can_refresh_to_live() {
        return Vec::new();
    }
    match state.attempt.as_ref() {
        Some(attempt) => {
            tender_info!("fetching live results for search_id={}", attempt.search_id);
            vec![Effect::FetchLiveResults {
                attempt: attempt.id,
                search_id: attempt.search_id.clone(),
            }]
        }
        None => Vec::new(),
    }
}

fn live_results_loaded(
    state: &mut AppState,
    id: AttemptId,
    result: Result<ResultSnapshot, SearchError>,
) -> Vec<Effect> {
    let refreshing_artifacts = state
        .attempt
        .as_ref()
        .is_some_and(|attempt| attempt.id == id && attempt.artifact_refresh);
    if refreshing_artifacts && state.displayed_from == Some(id) {
        return artifact_refresh_loaded(state, id, result);
    }
    if !state.can_refresh_to_live() || state.attempt.as_ref().map(|a| a.id) != Some(id) {
        tender_debug!("ignoring live results for attempt {}", id);
        return Vec::new();
    }
    match result {
        Ok(snapshot) => {
            if let Some(attempt) = state.attempt.as_mut() {
                attempt.live_fetch_pending = snapshot.live_fetch_in_progress;
            }
            if let Some(request) = state.last_request.clone() {
                state.last_success = Some((request, snapshot.clone()));
            }
            tender_info!(
                "live results replaced cached snapshot filtered={}",
                snapshot.filtered_count
            );
            state.displayed = Some(snapshot);
            state.mark_dirty();
            let mut effects = vec![Effect::PersistSession(state.session_snapshot())];
            effects.extend(close_channel_if_settled(state));
            effects
        }
        Err(error) if error.kind == ErrorKind::Cancelled => Vec::new(),
        Err(error) => {
            tender_warn!("live results failed: {}", error);
            state.push_notice(
                NoticeKind::ReconcileFailed,
                format!(
                    "Could not load the live results; still showing cached data. {}",
                    error.user_message()
                ),
            );
            Vec::new()
        }
    }
}

fn restore_session(state: &mut AppState, snapshot: SessionSnapshot) {
    if state.attempt.is_some() {
        tender_debug!("ignoring session restore while a search exists");
        return;
    }
    let SessionSnapshot {
        last_request,
        last_success,
    } = snapshot;
    state.last_request = last_request.or_else(|| last_success.as_ref().map(|(r, _)| r.clone()));
    if let Some((request, result)) = last_success {
        if result.is_usable() {
            state.displayed = Some(result.clone());
            state.displayed_from = None;
            state.push_notice(NoticeKind::Restored, "Restored the results of your last search.");
        }
        state.last_success = Some((request, result));
    }
    state.mark_dirty();
}
