use std::time::Duration;

use chrono::NaiveDate;
use tender_core::{
    estimate_duration, simulated_progress, update, AppState, BatchProgress, Effect, Msg,
    ProgressEvent, RegionState, RegionTracker, RegionUpdate, SearchRequest, Stage,
};

fn submit(state: AppState, regions: &[&str]) -> (AppState, Vec<Effect>) {
    let request = SearchRequest::new(
        regions.iter().map(|r| r.to_string()).collect(),
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
    );
    update(
        state,
        Msg::SubmitClicked {
            request,
            force_fresh: false,
        },
    )
}

fn region(region: &str, state: RegionState, count: Option<u64>, attempt: u32) -> Msg {
    Msg::RegionStatusChanged {
        attempt: 1,
        update: RegionUpdate {
            region: region.to_string(),
            state,
            count,
            attempt,
        },
    }
}

#[test]
fn seeding_creates_one_pending_entry_per_region() {
    for n in 0..12 {
        let codes: Vec<String> = (0..n).map(|i| format!("R{i:02}")).collect();
        let mut tracker = RegionTracker::default();
        tracker.seed(&codes);
        assert_eq!(tracker.len(), n);
        assert!(tracker
            .iter()
            .all(|(_, entry)| entry.state == RegionState::Pending));
    }
}

#[test]
fn mixed_outcomes_aggregate_to_total_and_completion() {
    let (state, _) = submit(AppState::new(), &["AC", "BA", "CE", "DF", "ES"]);
    let (state, _) = update(state, region("AC", RegionState::Success, Some(10), 0));
    let (state, _) = update(state, region("BA", RegionState::Success, Some(0), 0));
    let (state, _) = update(state, region("CE", RegionState::Success, Some(7), 0));
    let (state, _) = update(state, region("DF", RegionState::Failed, None, 0));
    let (state, _) = update(state, region("ES", RegionState::Failed, None, 0));
    assert!(state.view().all_regions_complete);
    assert_eq!(state.view().total_found, 17);

    let (state, _) = update(state, region("ES", RegionState::Recovered, Some(2), 1));
    let view = state.view();
    assert_eq!(view.total_found, 19);
    assert!(view.all_regions_complete);
}

#[test]
fn regions_in_flight_are_not_complete() {
    let (state, _) = submit(AppState::new(), &["SP", "RJ"]);
    let (state, _) = update(state, region("SP", RegionState::Success, Some(3), 0));
    let (state, _) = update(state, region("RJ", RegionState::Retrying, None, 1));
    assert!(!state.view().all_regions_complete);
    assert_eq!(state.view().total_found, 3);
}

#[test]
fn total_found_never_decreases() {
    let (mut state, _) = submit(AppState::new(), &["SP", "RJ", "MG"]);
    let sequence = [
        region("SP", RegionState::Fetching, None, 0),
        region("SP", RegionState::Success, Some(5), 0),
        region("SP", RegionState::Fetching, None, 0),
        region("RJ", RegionState::Failed, None, 1),
        region("SP", RegionState::Recovered, Some(1), 2),
        region("RJ", RegionState::Retrying, None, 2),
        region("RJ", RegionState::Recovered, Some(4), 2),
        region("RJ", RegionState::Failed, None, 3),
        region("MG", RegionState::Success, Some(2), 1),
        region("MG", RegionState::Retrying, None, 0),
    ];
    let mut previous = 0;
    for msg in sequence {
        let (next, _) = update(state, msg);
        state = next;
        let total = state.view().total_found;
        assert!(total >= previous, "total regressed from {previous} to {total}");
        previous = total;
    }
    assert_eq!(previous, 11);
}

#[test]
fn stale_region_attempts_are_dropped() {
    let mut tracker = RegionTracker::default();
    tracker.seed(&["SP"]);
    assert!(tracker.apply(RegionUpdate {
        region: "SP".to_string(),
        state: RegionState::Retrying,
        count: None,
        attempt: 2,
    }));
    assert!(!tracker.apply(RegionUpdate {
        region: "SP".to_string(),
        state: RegionState::Fetching,
        count: None,
        attempt: 1,
    }));
    assert_eq!(tracker.get("SP").map(|e| e.state), Some(RegionState::Retrying));
}

#[test]
fn unknown_regions_are_ignored() {
    let mut tracker = RegionTracker::default();
    tracker.seed(&["SP"]);
    assert!(!tracker.apply(RegionUpdate {
        region: "XX".to_string(),
        state: RegionState::Success,
        count: Some(9),
        attempt: 0,
    }));
    assert_eq!(tracker.total_found(), 0);
}

#[test]
fn new_attempt_clears_previous_region_state() {
    let (state, _) = submit(AppState::new(), &["SP", "RJ"]);
    let (state, _) = update(state, region("SP", RegionState::Success, Some(3), 0));
    let (state, _) = submit(state, &["MG"]);
    let view = state.view();
    assert_eq!(view.regions.len(), 1);
    assert_eq!(view.regions[0].region, "MG");
    assert_eq!(view.total_found, 0);
}

#[test]
fn batch_progress_is_exposed() {
    let (state, _) = submit(AppState::new(), &["SP", "RJ", "MG"]);
    let batch = BatchProgress {
        batch: 2,
        total_batches: 3,
        regions: vec!["MG".to_string()],
    };
    let (state, _) = update(
        state,
        Msg::BatchProgressed {
            attempt: 1,
            batch: batch.clone(),
        },
    );
    assert_eq!(state.view().batch, Some(batch));
}

#[test]
fn effective_progress_never_regresses() {
    let (state, _) = submit(AppState::new(), &["SP"]);
    let (state, _) = update(
        state,
        Msg::StatusPushed {
            attempt: 1,
            event: ProgressEvent::new(Stage::Fetching, 40, "fetching"),
        },
    );
    assert_eq!(state.view().progress, 40);

    let (state, _) = update(
        state,
        Msg::StatusPushed {
            attempt: 1,
            event: ProgressEvent::new(Stage::Filtering, 25, "filtering"),
        },
    );
    let view = state.view();
    assert_eq!(view.progress, 40);
    assert_eq!(view.stage, Some(Stage::Filtering));
    assert_eq!(view.message, "filtering");

    let estimate = state.attempt().map(|a| a.estimate).unwrap();
    let (state, _) = update(
        state,
        Msg::ProgressTick {
            attempt: 1,
            elapsed: estimate * 2,
        },
    );
    let simulated = simulated_progress(estimate * 2, estimate);
    assert!(simulated > 40);
    assert_eq!(state.view().progress, simulated);
    assert!(state.view().overtime);

    let (state, _) = update(
        state,
        Msg::StatusPushed {
            attempt: 1,
            event: ProgressEvent::new(Stage::Complete, 100, "done"),
        },
    );
    assert_eq!(state.view().progress, 100);
}

#[test]
fn simulated_progress_stays_below_ceiling() {
    let estimate = Duration::from_secs(20);
    let mut previous = 0;
    for secs in 0..600 {
        let value = simulated_progress(Duration::from_secs(secs), estimate);
        assert!(value >= previous);
        assert!(value < 100);
        previous = value;
    }
    assert_eq!(simulated_progress(Duration::ZERO, estimate), 0);
}

#[test]
fn estimate_grows_with_regions_and_range() {
    let small = estimate_duration(1, 7);
    let more_regions = estimate_duration(12, 7);
    let longer_range = estimate_duration(1, 180);
    assert!(more_regions > small);
    assert!(longer_range > small);
    assert!(estimate_duration(500, 3650) <= Duration::from_secs(180));
}
