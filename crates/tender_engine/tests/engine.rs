use std::time::{Duration, Instant};

use serde_json::json;
use tender_engine::{
    EngineCommand, EngineEvent, EngineHandle, EngineSettings, FailureKind, SearchPayload,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(server: &MockServer) -> EngineSettings {
    EngineSettings {
        base_url: format!("{}/api/", server.uri()),
        progress_tick: Duration::from_millis(20),
        countdown_tick: Duration::from_millis(20),
        ..EngineSettings::default()
    }
}

fn payload(search_id: &str) -> SearchPayload {
    SearchPayload {
        search_id: search_id.to_string(),
        regions: vec!["MG".to_string()],
        date_from: "2026-06-01".to_string(),
        date_to: "2026-06-07".to_string(),
        mode: "keywords".to_string(),
        sector_or_keywords: "asphalt".to_string(),
        status: Some("open".to_string()),
        modality_codes: Vec::new(),
        value_min: None,
        value_max: None,
        jurisdiction_levels: vec!["municipal".to_string()],
        municipality_codes: Vec::new(),
        sort: "newest_first".to_string(),
        force_fresh: true,
    }
}

/// Waits for the first event accepted by `pick`, skipping the rest.
fn wait_for<T>(
    engine: &EngineHandle,
    timeout: Duration,
    mut pick: impl FnMut(EngineEvent) -> Option<T>,
) -> Option<T> {
    let deadline = Instant::now() + timeout;
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        if let Some(event) = engine.recv_timeout(remaining) {
            if let Some(found) = pick(event) {
                return Some(found);
            }
        }
    }
    None
}

#[tokio::test(flavor = "multi_thread")]
async fn submit_reports_completion() {
    tender_logging::initialize_for_tests();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "raw_count": 9,
            "filtered_count": 3,
            "freshness": "live"
        })))
        .mount(&server)
        .await;

    let engine = EngineHandle::new(settings(&server)).unwrap();
    engine.send(EngineCommand::Submit {
        attempt: 1,
        payload: payload("t-1"),
    });

    let result = wait_for(&engine, Duration::from_secs(5), |event| match event {
        EngineEvent::SearchCompleted { attempt: 1, result } => Some(result),
        _ => None,
    })
    .expect("completion event");
    assert_eq!(result.unwrap().filtered_count, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn abort_cancels_in_flight_submit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let engine = EngineHandle::new(settings(&server)).unwrap();
    engine.send(EngineCommand::Submit {
        attempt: 2,
        payload: payload("t-2"),
    });
    engine.send(EngineCommand::Abort { attempt: 2 });

    let result = wait_for(&engine, Duration::from_secs(3), |event| match event {
        EngineEvent::SearchCompleted { attempt: 2, result } => Some(result),
        _ => None,
    })
    .expect("cancelled completion");
    assert_eq!(result.unwrap_err().kind, FailureKind::Cancelled);
}

#[tokio::test(flavor = "multi_thread")]
async fn progress_timer_ticks_until_stopped() {
    let server = MockServer::start().await;
    let engine = EngineHandle::new(settings(&server)).unwrap();
    engine.send(EngineCommand::StartProgressTimer { attempt: 3 });

    let elapsed = wait_for(&engine, Duration::from_secs(2), |event| match event {
        EngineEvent::ProgressTick { attempt: 3, elapsed } => Some(elapsed),
        _ => None,
    })
    .expect("tick");
    assert!(elapsed >= Duration::from_millis(20));

    engine.send(EngineCommand::StopProgressTimer { attempt: 3 });
    std::thread::sleep(Duration::from_millis(100));
    while engine.try_recv().is_some() {}
    assert!(engine.recv_timeout(Duration::from_millis(100)).is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn countdown_ticks_for_its_attempt_and_is_replaced() {
    let server = MockServer::start().await;
    let engine = EngineHandle::new(settings(&server)).unwrap();
    engine.send(EngineCommand::StartCountdown { attempt: 4 });
    engine.send(EngineCommand::StartCountdown { attempt: 5 });

    let mut seen = Vec::new();
    wait_for(&engine, Duration::from_secs(2), |event| match event {
        EngineEvent::CountdownTick { attempt } => {
            seen.push(attempt);
            (seen.len() == 3).then_some(())
        }
        _ => None,
    })
    .expect("ticks");
    assert_eq!(seen, vec![5, 5, 5]);

    engine.send(EngineCommand::StopCountdown);
    std::thread::sleep(Duration::from_millis(100));
    while engine.try_recv().is_some() {}
    assert!(engine.recv_timeout(Duration::from_millis(100)).is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_notice_reaches_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/search/t-9/cancel"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let engine = EngineHandle::new(settings(&server)).unwrap();
    engine.send(EngineCommand::NotifyCancel {
        search_id: "t-9".to_string(),
    });
    tokio::time::sleep(Duration::from_millis(300)).await;
    server.verify().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn live_results_are_delivered_for_the_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/search/t-6/results"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "raw_count": 50,
            "filtered_count": 21,
            "freshness": "live"
        })))
        .mount(&server)
        .await;

    let engine = EngineHandle::new(settings(&server)).unwrap();
    engine.send(EngineCommand::FetchLiveResults {
        attempt: 6,
        search_id: "t-6".to_string(),
    });
    let result = wait_for(&engine, Duration::from_secs(5), |event| match event {
        EngineEvent::LiveResults { attempt: 6, result } => Some(result),
        _ => None,
    })
    .expect("live results");
    assert_eq!(result.unwrap().filtered_count, 21);
}
