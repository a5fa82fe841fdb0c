use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use tender_core::{
    manual_cooldown_secs, update, AppState, AttemptId, AttemptState, Effect, ErrorKind, Msg,
    RetryPlan, RetryPolicy, SearchError, SearchRequest,
};

fn init_logging() {
    tender_logging::initialize_for_tests();
}

fn request() -> SearchRequest {
    SearchRequest::new(
        vec!["SP".to_string()],
        NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
        NaiveDate::from_ymd_opt(2026, 2, 28).unwrap(),
    )
}

fn transient() -> SearchError {
    SearchError::new(ErrorKind::Transient, "service unavailable").with_status(503)
}

fn fail(state: AppState, attempt: AttemptId) -> (AppState, Vec<Effect>) {
    update(
        state,
        Msg::SearchCompleted {
            attempt,
            result: Err(transient()),
        },
    )
}

fn countdown_seconds(effects: &[Effect]) -> Option<u32> {
    effects.iter().find_map(|effect| match effect {
        Effect::StartCountdown { seconds, .. } => Some(*seconds),
        _ => None,
    })
}

/// Ticks the countdown to zero and returns the effects of the final tick.
fn run_countdown(mut state: AppState, attempt: AttemptId, seconds: u32) -> (AppState, Vec<Effect>) {
    let mut last = Vec::new();
    for _ in 0..seconds {
        let (next, effects) = update(state, Msg::CountdownTick { attempt });
        state = next;
        last = effects;
    }
    (state, last)
}

#[test]
fn transient_failures_escalate_then_stop_after_three_retries() {
    init_logging();
    let (mut state, _) = update(
        AppState::new(),
        Msg::SubmitClicked {
            request: request(),
            force_fresh: true,
        },
    );

    let mut cooldowns = Vec::new();
    let mut attempt = 1;
    loop {
        let (next, effects) = fail(state, attempt);
        state = next;
        let Some(seconds) = countdown_seconds(&effects) else {
            break;
        };
        assert_eq!(state.phase(), AttemptState::Retrying);
        cooldowns.push(seconds);

        let (next, effects) = run_countdown(state, attempt, seconds);
        state = next;
        assert_eq!(effects[0], Effect::StopCountdown);
        attempt += 1;
        assert!(effects.iter().any(|effect| matches!(
            effect,
            Effect::DispatchSearch { attempt: a, force_fresh: false, .. } if *a == attempt
        )));
        assert!(state.attempt().is_some_and(|a| a.automatic));
    }

    assert_eq!(cooldowns, vec![10, 20, 30]);
    assert_eq!(state.auto_retries(), 3);
    assert_eq!(state.phase(), AttemptState::Failed);
    let error = state.view().error.expect("failure displayed");
    assert_eq!(error.kind, ErrorKind::Transient);
}

#[test]
fn countdown_is_exposed_tick_by_tick() {
    init_logging();
    let (state, _) = update(
        AppState::new(),
        Msg::SubmitClicked {
            request: request(),
            force_fresh: false,
        },
    );
    let (state, _) = fail(state, 1);
    assert_eq!(state.countdown_remaining(), Some(10));

    let (state, effects) = update(state, Msg::CountdownTick { attempt: 1 });
    assert!(effects.is_empty());
    let view = state.view();
    let countdown = view.countdown.expect("countdown visible");
    assert_eq!(countdown.remaining_secs, 9);
    assert_eq!(countdown.retry_number, 1);
    assert_eq!(countdown.max_retries, 3);
    assert!(view.error.is_some());
}

#[test]
fn user_submit_resets_retry_bookkeeping() {
    init_logging();
    let (state, _) = update(
        AppState::new(),
        Msg::SubmitClicked {
            request: request(),
            force_fresh: false,
        },
    );
    let (state, _) = fail(state, 1);
    let (state, _) = update(state, Msg::RetryNowClicked);
    assert_eq!(state.auto_retries(), 1);

    let (state, effects) = update(state, Msg::RefreshClicked);
    assert_eq!(state.auto_retries(), 0);
    assert!(!effects.contains(&Effect::StopCountdown));

    let (_state, effects) = fail(state, 3);
    assert_eq!(countdown_seconds(&effects), Some(10));
}

#[test]
fn retry_now_skips_the_countdown() {
    init_logging();
    let (state, _) = update(
        AppState::new(),
        Msg::SubmitClicked {
            request: request(),
            force_fresh: false,
        },
    );
    let (state, _) = fail(state, 1);
    let (state, effects) = update(state, Msg::RetryNowClicked);

    assert_eq!(effects[0], Effect::StopCountdown);
    assert!(effects
        .iter()
        .any(|effect| matches!(effect, Effect::DispatchSearch { attempt: 2, .. })));
    assert_eq!(state.countdown_remaining(), None);
    assert_eq!(state.phase(), AttemptState::Submitting);
}

#[test]
fn cancel_retry_leaves_failure_displayed() {
    init_logging();
    let (state, _) = update(
        AppState::new(),
        Msg::SubmitClicked {
            request: request(),
            force_fresh: false,
        },
    );
    let (state, _) = fail(state, 1);
    let (state, effects) = update(state, Msg::CancelRetryClicked);

    assert_eq!(effects, vec![Effect::StopCountdown]);
    assert_eq!(state.phase(), AttemptState::Failed);
    assert!(state.view().error.is_some());
    assert!(state.view().countdown.is_none());

    let (state, effects) = update(state, Msg::CountdownTick { attempt: 1 });
    assert!(effects.is_empty());
    assert_eq!(state.phase(), AttemptState::Failed);
}

#[test]
fn new_submit_clears_a_running_countdown_first() {
    init_logging();
    let (state, _) = update(
        AppState::new(),
        Msg::SubmitClicked {
            request: request(),
            force_fresh: false,
        },
    );
    let (state, _) = fail(state, 1);
    let (state, effects) = update(
        state,
        Msg::SubmitClicked {
            request: request(),
            force_fresh: false,
        },
    );
    assert_eq!(effects[0], Effect::StopCountdown);
    assert_eq!(effects[1], Effect::AbortRequest { attempt: 1 });

    let (state, effects) = update(state, Msg::CountdownTick { attempt: 1 });
    assert!(effects.is_empty());
    assert_eq!(state.attempt().map(|a| a.id), Some(2));
}

#[test]
fn non_transient_failures_do_not_schedule_retries() {
    init_logging();
    for error in [
        SearchError::new(ErrorKind::Validation, "bad").with_status(400),
        SearchError::new(ErrorKind::Unknown, "weird"),
        SearchError::new(ErrorKind::Authorization, "quota").with_status(403),
    ] {
        let (state, _) = update(
            AppState::new(),
            Msg::SubmitClicked {
                request: request(),
                force_fresh: false,
            },
        );
        let (state, effects) = update(
            state,
            Msg::SearchCompleted {
                attempt: 1,
                result: Err(error),
            },
        );
        assert_eq!(countdown_seconds(&effects), None);
        assert_eq!(state.phase(), AttemptState::Failed);
    }
}

#[test]
fn custom_policy_table_is_clamped_to_last_entry() {
    let policy = RetryPolicy {
        cooldowns: vec![5, 7],
        max_auto_retries: 4,
    };
    assert_eq!(policy.cooldown_for(0), 5);
    assert_eq!(policy.cooldown_for(1), 7);
    assert_eq!(policy.cooldown_for(2), 7);
    assert_eq!(policy.cooldown_for(9), 7);
}

#[test]
fn manual_cooldown_depends_on_status_and_message() {
    let cases = [
        (SearchError::new(ErrorKind::Transient, "slow down").with_status(429), 30),
        (SearchError::new(ErrorKind::Transient, "boom").with_status(500), 20),
        (SearchError::new(ErrorKind::Transient, "gateway").with_status(504), 15),
        (SearchError::new(ErrorKind::Transient, "request timed out"), 15),
        (SearchError::new(ErrorKind::Transient, "bad gateway").with_status(502), 10),
        (SearchError::new(ErrorKind::Unknown, "?"), 10),
    ];
    for (error, expected) in cases {
        assert_eq!(manual_cooldown_secs(&error), expected, "{error}");
    }
}

#[test]
fn retry_plan_follows_classification() {
    let policy = RetryPolicy::default();
    let plan = RetryPlan::for_error(&transient(), &policy);
    assert!(plan.auto_retry);
    assert_eq!(plan.max_auto_retries, 3);

    let rate_limited = SearchError::new(ErrorKind::Validation, "slow")
        .with_code("RATE_LIMITED")
        .with_data("retry_after", "45");
    let plan = RetryPlan::for_error(&rate_limited, &policy);
    assert!(!plan.auto_retry);
    assert_eq!(plan.cooldown_secs, 45);

    let auth = SearchError::new(ErrorKind::Authentication, "expired").with_status(401);
    assert!(!RetryPlan::for_error(&auth, &policy).auto_retry);
}

#[test]
fn status_classification() {
    assert_eq!(ErrorKind::from_status(401), ErrorKind::Authentication);
    assert_eq!(ErrorKind::from_status(403), ErrorKind::Authorization);
    assert_eq!(ErrorKind::from_status(429), ErrorKind::Transient);
    assert_eq!(ErrorKind::from_status(422), ErrorKind::Validation);
    assert_eq!(ErrorKind::from_status(503), ErrorKind::Transient);
    assert_eq!(ErrorKind::from_status(302), ErrorKind::Unknown);
}
