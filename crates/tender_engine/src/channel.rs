use std::time::Duration;

use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use tender_logging::{tender_debug, tender_info, tender_warn};
use tokio_util::sync::CancellationToken;

use crate::client::{ProgressSink, SearchApi};
use crate::sse::{SseDecoder, SseFrame};
use crate::{AttemptId, ChannelEvent, EngineEvent, Stage};

enum StreamOutcome {
    /// Ended after a `complete` stage.
    Finished,
    Failed(String),
    Cancelled,
}

/// Follows the progress channel of one search until it completes, fails
/// twice, or `cancel` fires.
///
/// A lost connection is retried once after `reconnect_delay`; a second loss
/// emits `ChannelEvent::Disconnected` and returns.
pub async fn run_channel(
    api: &dyn SearchApi,
    attempt: AttemptId,
    search_id: &str,
    reconnect_delay: Duration,
    sink: &dyn ProgressSink,
    cancel: CancellationToken,
) {
    let mut reconnect_available = true;
    loop {
        match stream_once(api, attempt, search_id, sink, &cancel).await {
            StreamOutcome::Cancelled => return,
            StreamOutcome::Finished => {
                tender_debug!("progress channel for {} finished", search_id);
                emit(sink, attempt, ChannelEvent::Closed);
                return;
            }
            StreamOutcome::Failed(reason) if reconnect_available => {
                reconnect_available = false;
                tender_warn!(
                    "progress channel for {} lost ({}); reconnecting in {:?}",
                    search_id,
                    reason,
                    reconnect_delay
                );
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(reconnect_delay) => {}
                }
            }
            StreamOutcome::Failed(reason) => {
                tender_warn!("progress channel for {} disconnected: {}", search_id, reason);
                emit(sink, attempt, ChannelEvent::Disconnected);
                return;
            }
        }
    }
}

async fn stream_once(
    api: &dyn SearchApi,
    attempt: AttemptId,
    search_id: &str,
    sink: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> StreamOutcome {
    let opened = tokio::select! {
        _ = cancel.cancelled() => return StreamOutcome::Cancelled,
        opened = api.open_events(search_id) => opened,
    };
    let mut stream = match opened {
        Ok(stream) => stream,
        Err(err) => return StreamOutcome::Failed(err.to_string()),
    };
    tender_info!("progress channel for {} connected", search_id);
    emit(sink, attempt, ChannelEvent::Connected);

    let mut decoder = SseDecoder::new();
    let mut completed = false;
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return StreamOutcome::Cancelled,
            next = stream.next() => next,
        };
        let chunk = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(err)) => return StreamOutcome::Failed(err.to_string()),
            None if completed => return StreamOutcome::Finished,
            None => return StreamOutcome::Failed("stream ended before completion".to_string()),
        };
        for frame in decoder.feed(&chunk) {
            if let Some(event) = parse_frame(&frame) {
                if matches!(&event, ChannelEvent::Status(status) if status.stage == Stage::Complete) {
                    completed = true;
                }
                emit(sink, attempt, event);
            }
        }
    }
}

/// Maps a named frame to a channel event; unknown names and bad payloads are skipped.
fn parse_frame(frame: &SseFrame) -> Option<ChannelEvent> {
    match frame.event.as_str() {
        "status" => decode(frame).map(ChannelEvent::Status),
        "region_status" => decode(frame).map(ChannelEvent::RegionStatus),
        "batch_progress" => decode(frame).map(ChannelEvent::BatchProgress),
        other => {
            tender_debug!("ignoring progress channel event '{}'", other);
            None
        }
    }
}

fn decode<T: DeserializeOwned>(frame: &SseFrame) -> Option<T> {
    match serde_json::from_str(&frame.data) {
        Ok(value) => Some(value),
        Err(err) => {
            tender_warn!("malformed '{}' event: {}", frame.event, err);
            None
        }
    }
}

fn emit(sink: &dyn ProgressSink, attempt: AttemptId, event: ChannelEvent) {
    sink.emit(EngineEvent::Channel { attempt, event });
}
