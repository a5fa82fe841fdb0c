use std::collections::HashMap;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use tender_logging::{tender_debug, tender_info};
use tokio_util::sync::CancellationToken;

use crate::channel::run_channel;
use crate::client::{
    cancelled, submit_with_retries, ChannelProgressSink, EngineSettings, ProgressSink,
    ReqwestSearchApi, SearchApi,
};
use crate::poll::run_polling;
use crate::{ApiError, AttemptId, EngineEvent, SearchPayload};

/// Work the runner asks the engine to start or stop.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    Submit {
        attempt: AttemptId,
        payload: SearchPayload,
    },
    OpenChannel {
        attempt: AttemptId,
        search_id: String,
    },
    CloseChannel {
        attempt: AttemptId,
    },
    StartPolling {
        attempt: AttemptId,
        search_id: String,
    },
    StopPolling {
        attempt: AttemptId,
    },
    StartProgressTimer {
        attempt: AttemptId,
    },
    StopProgressTimer {
        attempt: AttemptId,
    },
    /// Cancels everything still running for the attempt and forgets it.
    Abort {
        attempt: AttemptId,
    },
    /// Fire-and-forget `POST /search/{id}/cancel`.
    NotifyCancel {
        search_id: String,
    },
    /// Replaces any running countdown.
    StartCountdown {
        attempt: AttemptId,
    },
    StopCountdown,
    FetchLiveResults {
        attempt: AttemptId,
        search_id: String,
    },
}

pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
}

impl EngineHandle {
    pub fn new(settings: EngineSettings) -> Result<Self, ApiError> {
        let api = Arc::new(ReqwestSearchApi::new(&settings)?);
        Ok(Self::with_api(api, settings))
    }

    pub fn with_api(api: Arc<dyn SearchApi>, settings: EngineSettings) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();

        thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
            let mut worker = Worker {
                runtime,
                api,
                settings,
                event_tx,
                attempts: HashMap::new(),
                countdown: None,
            };
            while let Ok(command) = cmd_rx.recv() {
                worker.handle(command);
            }
            tender_debug!("engine command channel closed");
        });

        Self { cmd_tx, event_rx }
    }

    pub fn send(&self, command: EngineCommand) {
        let _ = self.cmd_tx.send(command);
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }
}

/// Cancellation tokens of one attempt. Every subtask token is a child of `root`.
struct AttemptTasks {
    root: CancellationToken,
    timer: Option<CancellationToken>,
    polling: Option<CancellationToken>,
    channel: Option<CancellationToken>,
}

impl AttemptTasks {
    fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            timer: None,
            polling: None,
            channel: None,
        }
    }
}

fn stop(slot: &mut Option<CancellationToken>) {
    if let Some(token) = slot.take() {
        token.cancel();
    }
}

/// Replaces `slot` with a fresh child of `root`, cancelling the old one.
fn restart(slot: &mut Option<CancellationToken>, root: &CancellationToken) -> CancellationToken {
    stop(slot);
    let token = root.child_token();
    *slot = Some(token.clone());
    token
}

struct Worker {
    runtime: tokio::runtime::Runtime,
    api: Arc<dyn SearchApi>,
    settings: EngineSettings,
    event_tx: mpsc::Sender<EngineEvent>,
    attempts: HashMap<AttemptId, AttemptTasks>,
    countdown: Option<CancellationToken>,
}

impl Worker {
    fn sink(&self) -> ChannelProgressSink {
        ChannelProgressSink::new(self.event_tx.clone())
    }

    fn tasks(&mut self, attempt: AttemptId) -> &mut AttemptTasks {
        self.attempts.entry(attempt).or_insert_with(AttemptTasks::new)
    }

    fn handle(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Submit { attempt, payload } => {
                let token = self.tasks(attempt).root.child_token();
                let api = self.api.clone();
                let sink = self.sink();
                let delays = self.settings.submit_retry_delays.clone();
                self.runtime.spawn(async move {
                    let result =
                        submit_with_retries(api.as_ref(), attempt, &payload, &delays, &sink, &token)
                            .await;
                    sink.emit(EngineEvent::SearchCompleted { attempt, result });
                });
            }
            EngineCommand::OpenChannel { attempt, search_id } => {
                let tasks = self.tasks(attempt);
                let token = restart(&mut tasks.channel, &tasks.root);
                let api = self.api.clone();
                let sink = self.sink();
                let delay = self.settings.reconnect_delay;
                self.runtime.spawn(async move {
                    run_channel(api.as_ref(), attempt, &search_id, delay, &sink, token).await;
                });
            }
            EngineCommand::CloseChannel { attempt } => {
                if let Some(tasks) = self.attempts.get_mut(&attempt) {
                    stop(&mut tasks.channel);
                }
            }
            EngineCommand::StartPolling { attempt, search_id } => {
                let tasks = self.tasks(attempt);
                let token = restart(&mut tasks.polling, &tasks.root);
                let api = self.api.clone();
                let sink = self.sink();
                let interval = self.settings.poll_interval;
                self.runtime.spawn(async move {
                    run_polling(api.as_ref(), attempt, &search_id, interval, &sink, token).await;
                });
            }
            EngineCommand::StopPolling { attempt } => {
                if let Some(tasks) = self.attempts.get_mut(&attempt) {
                    stop(&mut tasks.polling);
                }
            }
            EngineCommand::StartProgressTimer { attempt } => {
                let tasks = self.tasks(attempt);
                let token = restart(&mut tasks.timer, &tasks.root);
                let sink = self.sink();
                let period = self.settings.progress_tick;
                self.runtime.spawn(async move {
                    let started = tokio::time::Instant::now();
                    let mut ticker = tokio::time::interval_at(started + period, period);
                    loop {
                        tokio::select! {
                            _ = token.cancelled() => return,
                            _ = ticker.tick() => sink.emit(EngineEvent::ProgressTick {
                                attempt,
                                elapsed: started.elapsed(),
                            }),
                        }
                    }
                });
            }
            EngineCommand::StopProgressTimer { attempt } => {
                if let Some(tasks) = self.attempts.get_mut(&attempt) {
                    stop(&mut tasks.timer);
                }
            }
            EngineCommand::Abort { attempt } => {
                if let Some(tasks) = self.attempts.remove(&attempt) {
                    tender_debug!("aborting attempt {}", attempt);
                    tasks.root.cancel();
                }
            }
            EngineCommand::NotifyCancel { search_id } => {
                let api = self.api.clone();
                self.runtime.spawn(async move {
                    match api.cancel(&search_id).await {
                        Ok(()) => tender_info!("server cancelled search {}", search_id),
                        Err(err) => tender_debug!("cancel notice for {} failed: {}", search_id, err),
                    }
                });
            }
            EngineCommand::StartCountdown { attempt } => {
                stop(&mut self.countdown);
                let token = CancellationToken::new();
                self.countdown = Some(token.clone());
                let sink = self.sink();
                let period = self.settings.countdown_tick;
                self.runtime.spawn(async move {
                    let mut ticker =
                        tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                    loop {
                        tokio::select! {
                            _ = token.cancelled() => return,
                            _ = ticker.tick() => sink.emit(EngineEvent::CountdownTick { attempt }),
                        }
                    }
                });
            }
            EngineCommand::StopCountdown => stop(&mut self.countdown),
            EngineCommand::FetchLiveResults { attempt, search_id } => {
                let token = self.tasks(attempt).root.child_token();
                let api = self.api.clone();
                let sink = self.sink();
                self.runtime.spawn(async move {
                    let result = tokio::select! {
                        _ = token.cancelled() => Err(cancelled()),
                        result = api.live_results(&search_id) => result,
                    };
                    sink.emit(EngineEvent::LiveResults { attempt, result });
                });
            }
        }
    }
}
