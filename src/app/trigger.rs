use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{self, MissedTickBehavior};

use crate::error::{AppError, Result};
use crate::services::RankingEngine;

use super::orchestrator::{log_rankings, Orchestrator};

/// Authorization state pushed by the upstream gatekeeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthStatus {
    Authorized,
    Forbidden,
}

impl FromStr for AuthStatus {
    type Err = AppError;

    /// Accepts a JSON string (`"AUTHORIZED"`) or a bare word, case-insensitive.
    fn from_str(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let word = if trimmed.starts_with('"') {
            serde_json::from_str::<String>(trimmed)?
        } else {
            trimmed.to_string()
        };

        match word.to_ascii_uppercase().as_str() {
            "AUTHORIZED" => Ok(AuthStatus::Authorized),
            "FORBIDDEN" => Ok(AuthStatus::Forbidden),
            other => Err(AppError::message(format!("unknown auth status `{other}`"))),
        }
    }
}

/// Owner of the halt flag shared by the orchestrator, the pipeline and the interval loops.
pub struct RunControl {
    halt: watch::Sender<bool>,
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControl {
    pub fn new() -> Self {
        let (halt, _) = watch::channel(false);
        Self { halt }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.halt.subscribe()
    }

    pub fn is_halted(&self) -> bool {
        *self.halt.borrow()
    }

    pub fn halt(&self) {
        self.halt.send_replace(true);
    }

    pub fn resume(&self) {
        self.halt.send_replace(false);
    }

    /// Apply an auth status. Returns `true` when a run should be started.
    pub fn handle(&self, status: AuthStatus) -> bool {
        match status {
            AuthStatus::Authorized => {
                info!("Loader authorized.");
                self.resume();
                true
            }
            AuthStatus::Forbidden => {
                warn!("Loader forbidden; halting.");
                self.halt();
                false
            }
        }
    }
}

/// Run immediately, then every `period` until `halt` reads `true` or its sender is dropped.
/// Returns the number of completed runs.
pub async fn run_on_interval(
    orchestrator: Arc<Orchestrator>,
    period: Duration,
    mut halt: watch::Receiver<bool>,
) -> usize {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut runs = 0;

    loop {
        if *halt.borrow() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {
                orchestrator.run_once().await;
                runs += 1;
            }
            changed = halt.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!("Interval trigger stopped after {runs} runs.");
    runs
}

/// Log rankings every `period`, independent of refresh runs. Stops like [`run_on_interval`].
pub async fn report_on_interval(
    engine: RankingEngine,
    period: Duration,
    mut halt: watch::Receiver<bool>,
) -> usize {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut reports = 0;

    loop {
        if *halt.borrow() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {
                let _ = log_rankings(&engine).await;
                reports += 1;
            }
            changed = halt.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    reports
}

/// Consume auth-status lines from `reader` until EOF. An authorized message starts a run
/// unless one is already in flight; a forbidden message halts dispatch of the current one.
/// Returns the number of runs started.
pub async fn listen<R>(
    orchestrator: Arc<Orchestrator>,
    control: &RunControl,
    reader: R,
) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut in_flight = JoinSet::new();
    let mut started = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let status = match line.parse::<AuthStatus>() {
            Ok(status) => status,
            Err(err) => {
                warn!("Ignoring message: {err}");
                continue;
            }
        };

        while let Some(finished) = in_flight.try_join_next() {
            finished?;
        }

        if control.handle(status) {
            if in_flight.is_empty() {
                let orchestrator = Arc::clone(&orchestrator);
                in_flight.spawn(async move {
                    orchestrator.run_once().await;
                });
                started += 1;
            } else {
                debug!("Run already in progress; authorization noted.");
            }
        }
    }

    while let Some(finished) = in_flight.join_next().await {
        finished?;
    }
    Ok(started)
}
