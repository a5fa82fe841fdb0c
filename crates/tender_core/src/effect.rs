use crate::{AttemptId, SearchRequest, SessionSnapshot};

/// Instructions for the runner. Emitted in the order they must execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    DispatchSearch {
        attempt: AttemptId,
        search_id: String,
        request: SearchRequest,
        force_fresh: bool,
    },
    OpenChannel {
        attempt: AttemptId,
        search_id: String,
    },
    CloseChannel { attempt: AttemptId },
    StartPolling {
        attempt: AttemptId,
        search_id: String,
    },
    StopPolling { attempt: AttemptId },
    StartProgressTimer { attempt: AttemptId },
    StopProgressTimer { attempt: AttemptId },
    /// Cancels the attempt's shared token, aborting anything still running.
    AbortRequest { attempt: AttemptId },
    /// Best-effort remote cancellation; result ignored.
    NotifyCancel { search_id: String },
    StartCountdown { attempt: AttemptId, seconds: u32 },
    StopCountdown,
    FetchLiveResults {
        attempt: AttemptId,
        search_id: String,
    },
    PersistSession(SessionSnapshot),
    RedirectToSignIn,
}
