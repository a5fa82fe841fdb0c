use std::time::Duration;

use tender_logging::{tender_debug, tender_warn};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::client::{ProgressSink, SearchApi};
use crate::{AttemptId, EngineEvent};

/// Polls `GET /search/{id}/status` until a terminal status or cancellation.
///
/// The first request goes out immediately. Failed polls are logged and the
/// loop keeps going.
pub async fn run_polling(
    api: &dyn SearchApi,
    attempt: AttemptId,
    search_id: &str,
    interval: Duration,
    sink: &dyn ProgressSink,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = api.status(search_id) => result,
        };
        match result {
            Ok(snapshot) => {
                let terminal = snapshot.status.is_terminal();
                tender_debug!(
                    "polled {}: {:?} {:.0}%",
                    search_id,
                    snapshot.status,
                    snapshot.progress
                );
                sink.emit(EngineEvent::Polled { attempt, snapshot });
                if terminal {
                    return;
                }
            }
            Err(err) => tender_warn!("status poll for {} failed: {}", search_id, err),
        }
    }
}
