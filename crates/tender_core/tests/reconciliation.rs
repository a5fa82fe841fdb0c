use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use tender_core::{
    update, AppState, AttemptState, Deferred, Effect, ErrorKind, Freshness, Msg, NoticeKind,
    ResultSnapshot, SearchError, SearchRequest, SessionSnapshot,
};

fn request() -> SearchRequest {
    SearchRequest::new(
        vec!["PR".to_string()],
        NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
        NaiveDate::from_ymd_opt(2026, 5, 10).unwrap(),
    )
}

fn cached() -> ResultSnapshot {
    ResultSnapshot {
        raw_count: 30,
        filtered_count: 12,
        freshness: Freshness::Cached,
        sources: vec!["pncp".to_string()],
        summary: Deferred::Ready("cached summary".to_string()),
        export: Deferred::Ready("exports/cached.csv".to_string()),
        live_fetch_in_progress: true,
        cache_age_secs: Some(3600),
    }
}

fn live() -> ResultSnapshot {
    ResultSnapshot {
        raw_count: 41,
        filtered_count: 15,
        freshness: Freshness::Live,
        sources: vec!["pncp".to_string(), "comprasnet".to_string()],
        summary: Deferred::Ready("live summary".to_string()),
        export: Deferred::Ready("exports/live.csv".to_string()),
        live_fetch_in_progress: false,
        cache_age_secs: None,
    }
}

fn showing_cached() -> (AppState, Vec<Effect>) {
    let (state, _) = update(
        AppState::new(),
        Msg::SubmitClicked {
            request: request(),
            force_fresh: false,
        },
    );
    let (state, _) = update(state, Msg::ChannelConnected { attempt: 1 });
    update(
        state,
        Msg::SearchCompleted {
            attempt: 1,
            result: Ok(cached()),
        },
    )
}

#[test]
fn background_fetch_keeps_channel_open() {
    let (state, effects) = showing_cached();
    assert!(!effects.contains(&Effect::CloseChannel { attempt: 1 }));

    let view = state.view();
    assert_eq!(view.phase, AttemptState::Succeeded);
    assert!(view.can_refresh_to_live);
    assert_eq!(
        view.notices.last().map(|n| n.kind),
        Some(NoticeKind::BackgroundFetch)
    );
    assert!(!state.is_settled());
}

#[test]
fn refresh_to_live_swaps_snapshot_wholesale() {
    let (state, _) = showing_cached();
    let (state, effects) = update(state, Msg::RefreshToLiveClicked);
    assert_eq!(
        effects,
        vec![Effect::FetchLiveResults {
            attempt: 1,
            search_id: "local-1".to_string()
        }]
    );

    let (state, effects) = update(
        state,
        Msg::LiveResultsLoaded {
            attempt: 1,
            result: Ok(live()),
        },
    );
    assert!(matches!(effects[0], Effect::PersistSession(_)));
    assert_eq!(effects[1], Effect::CloseChannel { attempt: 1 });

    let view = state.view();
    assert_eq!(view.result, Some(live()));
    assert!(!view.can_refresh_to_live);
    assert_eq!(state.session_snapshot().last_success, Some((request(), live())));
}

#[test]
fn failed_live_fetch_keeps_cached_snapshot() {
    let (state, _) = showing_cached();
    let (state, _) = update(state, Msg::RefreshToLiveClicked);
    let (state, effects) = update(
        state,
        Msg::LiveResultsLoaded {
            attempt: 1,
            result: Err(SearchError::new(ErrorKind::Transient, "unavailable").with_status(503)),
        },
    );

    assert!(effects.is_empty());
    let view = state.view();
    assert_eq!(view.result, Some(cached()));
    assert!(view.error.is_none());
    assert!(view.can_refresh_to_live);
    assert_eq!(
        view.notices.last().map(|n| n.kind),
        Some(NoticeKind::ReconcileFailed)
    );
}

#[test]
fn live_results_for_superseded_attempt_are_ignored() {
    let (state, _) = showing_cached();
    let (state, _) = update(state, Msg::RefreshToLiveClicked);
    let (state, _) = update(state, Msg::RefreshClicked);
    let (state, effects) = update(
        state,
        Msg::LiveResultsLoaded {
            attempt: 1,
            result: Ok(live()),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.view().result, None);
}

#[test]
fn abandoning_background_fetch_notifies_server() {
    let (state, _) = showing_cached();
    let (state, effects) = update(state, Msg::CancelClicked);
    assert_eq!(
        effects,
        vec![
            Effect::CloseChannel { attempt: 1 },
            Effect::AbortRequest { attempt: 1 },
            Effect::NotifyCancel {
                search_id: "local-1".to_string()
            },
        ]
    );
    let view = state.view();
    assert_eq!(view.phase, AttemptState::Succeeded);
    assert_eq!(view.result, Some(cached()));
    assert!(!view.can_refresh_to_live);
}

#[test]
fn restored_session_shows_previous_results_and_can_repeat() {
    let snapshot = SessionSnapshot {
        last_request: Some(request()),
        last_success: Some((request(), live())),
    };
    let (state, effects) = update(AppState::new(), Msg::RestoreSession(snapshot));
    assert!(effects.is_empty());

    let view = state.view();
    assert_eq!(view.result, Some(live()));
    assert!(view.can_repeat);
    assert_eq!(view.notices.last().map(|n| n.kind), Some(NoticeKind::Restored));

    let (_state, effects) = update(state, Msg::RefreshClicked);
    assert!(effects.iter().any(|effect| matches!(
        effect,
        Effect::DispatchSearch { request: r, .. } if *r == request()
    )));
}

#[test]
fn restored_snapshot_is_used_as_fallback() {
    let snapshot = SessionSnapshot {
        last_request: None,
        last_success: Some((request(), live())),
    };
    let (state, _) = update(AppState::new(), Msg::RestoreSession(snapshot));
    let (state, _) = update(state, Msg::RefreshClicked);
    let (state, _) = update(
        state,
        Msg::SearchCompleted {
            attempt: 1,
            result: Err(SearchError::new(ErrorKind::Transient, "timeout").with_status(504)),
        },
    );
    let view = state.view();
    assert_eq!(view.result, Some(live()));
    assert!(view.error.is_none());
}

#[test]
fn artifacts_pending_after_polling_are_settled_from_final_snapshot() {
    let (state, _) = update(
        AppState::new(),
        Msg::SubmitClicked {
            request: request(),
            force_fresh: false,
        },
    );
    let (state, _) = update(state, Msg::ChannelConnected { attempt: 1 });
    let pending = ResultSnapshot {
        summary: Deferred::Pending,
        export: Deferred::Pending,
        live_fetch_in_progress: false,
        ..live()
    };
    let (state, _) = update(
        state,
        Msg::SearchCompleted {
            attempt: 1,
            result: Ok(pending),
        },
    );
    let (state, effects) = update(state, Msg::ChannelDisconnected { attempt: 1 });
    assert_eq!(
        effects,
        vec![Effect::StartPolling {
            attempt: 1,
            search_id: "local-1".to_string(),
        }]
    );

    let (state, effects) = update(
        state,
        Msg::StatusPolled {
            attempt: 1,
            event: tender_core::ProgressEvent::new(tender_core::Stage::Complete, 100, "done"),
            terminal: true,
        },
    );
    assert_eq!(
        effects,
        vec![Effect::FetchLiveResults {
            attempt: 1,
            search_id: "local-1".to_string(),
        }]
    );
    assert!(!state.is_settled());

    let fetched = ResultSnapshot {
        export: Deferred::Pending,
        ..live()
    };
    let (state, effects) = update(
        state,
        Msg::LiveResultsLoaded {
            attempt: 1,
            result: Ok(fetched),
        },
    );
    assert!(matches!(effects.as_slice(), [Effect::PersistSession(_)]));
    let shown = state.displayed().unwrap();
    assert_eq!(shown.summary, Deferred::Ready("live summary".to_string()));
    assert_eq!(shown.export, Deferred::Failed);
    assert!(state.is_settled());
}

#[test]
fn failed_final_snapshot_fetch_marks_artifacts_failed() {
    let (state, _) = update(
        AppState::new(),
        Msg::SubmitClicked {
            request: request(),
            force_fresh: false,
        },
    );
    let pending = ResultSnapshot {
        summary: Deferred::Pending,
        live_fetch_in_progress: false,
        ..live()
    };
    let (state, _) = update(
        state,
        Msg::SearchCompleted {
            attempt: 1,
            result: Ok(pending),
        },
    );
    let (state, _) = update(state, Msg::ChannelDisconnected { attempt: 1 });
    let (state, _) = update(
        state,
        Msg::StatusPolled {
            attempt: 1,
            event: tender_core::ProgressEvent::new(tender_core::Stage::Complete, 100, ""),
            terminal: true,
        },
    );
    let (state, _) = update(
        state,
        Msg::LiveResultsLoaded {
            attempt: 1,
            result: Err(SearchError::new(ErrorKind::Transient, "bad gateway").with_status(502)),
        },
    );
    let shown = state.displayed().unwrap();
    assert_eq!(shown.summary, Deferred::Failed);
    assert_eq!(shown.export, Deferred::Ready("exports/live.csv".to_string()));
    assert_eq!(shown.filtered_count, 15);
    assert!(state.is_settled());
}
