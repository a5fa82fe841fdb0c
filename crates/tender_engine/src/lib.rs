//! Tender engine: HTTP, progress channel and polling I/O for search attempts.
mod channel;
mod client;
mod engine;
mod persist;
mod poll;
mod sse;
mod types;

pub use channel::run_channel;
pub use client::{
    submit_with_retries, ChannelProgressSink, EngineSettings, EventStream, ProgressSink,
    ReqwestSearchApi, SearchApi,
};
pub use engine::{EngineCommand, EngineHandle};
pub use persist::{ensure_state_dir, AtomicFileWriter, PersistError};
pub use poll::run_polling;
pub use sse::{SseDecoder, SseFrame};
pub use types::{
    ApiError, ArtifactField, ArtifactStatus, AttemptId, BatchProgressEvent, ChannelEvent,
    EngineEvent, FailureKind, Freshness, PollStatus, RegionStatus, RegionStatusEvent,
    SearchPayload, SearchResponse, Stage, StatusDetail, StatusEvent, StatusSnapshot,
};
