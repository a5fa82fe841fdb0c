use std::time::Duration;

use crate::{
    AttemptId, BatchProgress, ProgressEvent, RegionUpdate, ResultSnapshot, SearchError,
    SearchRequest, SessionSnapshot,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// User submitted a new search.
    SubmitClicked {
        request: SearchRequest,
        force_fresh: bool,
    },
    /// User asked to repeat the last search.
    RefreshClicked,
    /// User cancelled the running search.
    CancelClicked,
    /// User skipped the auto-retry countdown.
    RetryNowClicked,
    /// User dismissed the auto-retry countdown.
    CancelRetryClicked,
    /// User asked to swap the cached result for the live one.
    RefreshToLiveClicked,
    /// Restore persisted session state on start.
    RestoreSession(SessionSnapshot),
    /// Engine is retrying the primary request after a 5xx.
    SubmitRetrying {
        attempt: AttemptId,
        retry: u32,
        delay: Duration,
    },
    /// Primary request finished.
    SearchCompleted {
        attempt: AttemptId,
        result: Result<ResultSnapshot, SearchError>,
    },
    /// Push channel subscription is up.
    ChannelConnected { attempt: AttemptId },
    /// Push channel failed and its single reconnect failed too.
    ChannelDisconnected { attempt: AttemptId },
    /// Push channel ended normally after the search completed.
    ChannelClosed { attempt: AttemptId },
    /// Stage/progress event from the push channel.
    StatusPushed {
        attempt: AttemptId,
        event: ProgressEvent,
    },
    /// Progress event synthesized from a polled status snapshot.
    StatusPolled {
        attempt: AttemptId,
        event: ProgressEvent,
        terminal: bool,
    },
    RegionStatusChanged {
        attempt: AttemptId,
        update: RegionUpdate,
    },
    BatchProgressed {
        attempt: AttemptId,
        batch: BatchProgress,
    },
    /// Simulated-progress timer tick with the attempt's elapsed time.
    ProgressTick {
        attempt: AttemptId,
        elapsed: Duration,
    },
    /// One second of the auto-retry countdown passed.
    CountdownTick { attempt: AttemptId },
    /// Finished live snapshot for a background fetch.
    LiveResultsLoaded {
        attempt: AttemptId,
        result: Result<ResultSnapshot, SearchError>,
    },
    /// Fallback for placeholder wiring.
    NoOp,
}
