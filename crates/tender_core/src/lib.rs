//! Tender search core: pure search-controller state machine and view-model helpers.
//!
//! Nothing in this crate performs I/O. The runner feeds [`Msg`]s into
//! [`update`] and executes the returned [`Effect`]s in order.
mod effect;
mod error;
mod msg;
pub mod progress;
mod regions;
mod retry;
mod state;
mod types;
mod update;
mod view_model;

pub use effect::Effect;
pub use error::{ErrorKind, SearchError};
pub use msg::Msg;
pub use progress::{effective_progress, estimate_duration, simulated_progress};
pub use regions::{BatchProgress, RegionEntry, RegionState, RegionTracker, RegionUpdate};
pub use retry::{manual_cooldown_secs, AutoRetry, Countdown, RetryPlan, RetryPolicy};
pub use state::{AppState, AttemptState, ChannelState, Notice, NoticeKind, SearchAttempt};
pub use types::{
    ArtifactUpdate, AttemptId, Deferred, Freshness, ProgressDetail, ProgressEvent,
    ResultSnapshot, SearchMode, SearchRequest, SessionSnapshot, SortOrder, Stage,
};
pub use update::update;
pub use view_model::{AppViewModel, CountdownView, ErrorView, RegionRowView};
