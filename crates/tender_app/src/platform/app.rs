use std::io::{self, Write};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use tender_core::{update, AppState, AttemptState, Msg};
use tender_logging::{set_search_context, tender_info};
use uuid::Uuid;

use super::config::AppConfig;
use super::effects::EffectRunner;
use super::{logging, persistence, render};
use crate::cli::{Cli, Command, RunArgs};

const EVENT_WAIT: Duration = Duration::from_millis(100);

const EXIT_FAILED: u8 = 1;
const EXIT_SIGN_IN: u8 = 3;

pub fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_cli(&cli);
    logging::initialize(config.log_destination, config.level());

    let session_tag = Uuid::new_v4().simple().to_string()[..8].to_string();
    let state = AppState::new()
        .with_session_tag(session_tag)
        .with_policy(config.retry_policy());
    let snapshot = persistence::load_session(&config.state_dir);
    let (state, _) = update(state, Msg::RestoreSession(snapshot));

    let (first, run_args) = match &cli.command {
        Command::Show => {
            let view = state.view();
            println!("{}", render::final_report(&view));
            return Ok(if view.result.is_some() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_FAILED)
            });
        }
        Command::Repeat(run_args) => {
            let Some(request) = state.last_request().cloned() else {
                bail!("no previous search to repeat; run `tender search` first");
            };
            let msg = if run_args.force_fresh {
                Msg::SubmitClicked {
                    request,
                    force_fresh: true,
                }
            } else {
                Msg::RefreshClicked
            };
            (msg, run_args.clone())
        }
        Command::Search(args) => {
            if args.to < args.from {
                bail!("--to ({}) is before --from ({})", args.to, args.from);
            }
            let msg = Msg::SubmitClicked {
                request: args.to_request(),
                force_fresh: args.run.force_fresh,
            };
            (msg, args.run.clone())
        }
    };

    let runner = EffectRunner::new(config.engine_settings(), config.state_dir.clone())
        .map_err(|err| anyhow::anyhow!("{err}"))
        .context("could not start the search engine")?;
    let mut session = Session {
        state,
        runner,
        last_line: String::new(),
    };
    session.drive(first, &run_args, config.engine_settings().poll_interval);

    let view = session.state.view();
    println!();
    println!("{}", render::final_report(&view));

    if session.runner.sign_in_required() {
        eprintln!("Sign in again and update the token in your config or pass --token.");
        return Ok(ExitCode::from(EXIT_SIGN_IN));
    }
    let failed = view.error.is_some() || view.phase == AttemptState::Cancelled;
    Ok(if failed {
        ExitCode::from(EXIT_FAILED)
    } else {
        ExitCode::SUCCESS
    })
}

struct Session {
    state: AppState,
    runner: EffectRunner,
    last_line: String,
}

impl Session {
    fn dispatch(&mut self, msg: Msg) {
        let state = std::mem::take(&mut self.state);
        let (mut state, effects) = update(state, msg);
        set_search_context(state.attempt().map(|attempt| attempt.search_id.as_str()));
        self.runner.run(effects);
        if state.consume_dirty() {
            self.print_progress(&state);
        }
        self.state = state;
    }

    fn print_progress(&mut self, state: &AppState) {
        let line = render::progress_line(&state.view());
        if line.is_empty() || line == self.last_line {
            return;
        }
        print!("\r\x1b[2K{line}");
        let _ = io::stdout().flush();
        self.last_line = line;
    }

    /// Runs until nothing is in flight or scheduled.
    ///
    /// With `--live`, cached results trigger a live fetch, repeated every
    /// `live_retry` while the server is still working on it.
    fn drive(&mut self, first: Msg, run_args: &RunArgs, live_retry: Duration) {
        self.dispatch(first);
        let mut last_live_request: Option<Instant> = None;
        loop {
            if self.finished(run_args) {
                break;
            }
            if run_args.live && self.state.view().can_refresh_to_live {
                let due = last_live_request.map_or(true, |at| at.elapsed() >= live_retry);
                if due {
                    tender_info!("requesting live results");
                    last_live_request = Some(Instant::now());
                    self.dispatch(Msg::RefreshToLiveClicked);
                }
            }
            if let Some(msg) = self.runner.next_msg(EVENT_WAIT) {
                self.dispatch(msg);
            }
        }
    }

    fn finished(&self, run_args: &RunArgs) -> bool {
        if self.state.is_settled() {
            return true;
        }
        // Without --live, a displayed result with settled artifacts is final.
        !run_args.live
            && self.state.phase() == AttemptState::Succeeded
            && self
                .state
                .displayed()
                .is_some_and(|result| result.artifacts_settled())
    }
}
