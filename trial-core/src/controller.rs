//! Client controller - the presentation side of a playthrough.
//!
//! The controller drives one session through a [`StoryBackend`], keeps the
//! state a UI renders (current segment, history, loading and error flags,
//! time left), and runs the countdown. The game ends exactly once: whichever
//! of "reached a terminal segment" and "ran out of time" lands first wins,
//! and the loser is dropped.

use crate::ending::{self, EndingQuery};
use crate::engine::{Action, EngineError, StoryEngine};
use crate::segment::{Branch, Segment};
use crate::session::SessionId;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Errors talking to the story backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The backend refused the request (bad input, wrong state).
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The backend broke. Retrying may help.
    #[error("Story service failure: {0}")]
    Failed(String),
}

/// Where the controller sends actions.
#[async_trait]
pub trait StoryBackend: Send + Sync {
    /// Apply an action to a session.
    async fn send(&self, session_id: &SessionId, action: Action) -> Result<Segment, BackendError>;

    /// Classify an ending.
    async fn check_ending(&self, query: &EndingQuery) -> Result<bool, BackendError>;
}

#[async_trait]
impl StoryBackend for StoryEngine {
    async fn send(&self, session_id: &SessionId, action: Action) -> Result<Segment, BackendError> {
        self.next_segment(session_id, action)
            .await
            .map_err(|e| match e {
                EngineError::InvalidAction(_) | EngineError::NotStarted(_) => {
                    BackendError::Rejected(e.to_string())
                }
                EngineError::Store(_) => BackendError::Failed(e.to_string()),
            })
    }

    async fn check_ending(&self, query: &EndingQuery) -> Result<bool, BackendError> {
        Ok(StoryEngine::check_ending(self, query))
    }
}

#[async_trait]
impl<B: StoryBackend + ?Sized> StoryBackend for Arc<B> {
    async fn send(&self, session_id: &SessionId, action: Action) -> Result<Segment, BackendError> {
        (**self).send(session_id, action).await
    }

    async fn check_ending(&self, query: &EndingQuery) -> Result<bool, BackendError> {
        (**self).check_ending(query).await
    }
}

/// Errors from controller operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControllerError {
    #[error("The trial has not started")]
    NotStarted,

    #[error("A request is already in flight")]
    Busy,

    #[error("The trial is over")]
    GameOver,

    #[error("Option {0} does not exist; pick 0 or 1")]
    InvalidOption(usize),

    #[error("Nothing to retry")]
    NothingToRetry,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// How the trial ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    Escaped,
    Died,
    TimeExpired,
}

impl Ending {
    pub fn is_success(self) -> bool {
        matches!(self, Ending::Escaped)
    }
}

/// One beat as the player saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub narrative: String,
    /// Label the player picked, once they picked one.
    pub chosen: Option<String>,
}

/// Summary handed to the result screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndingReport {
    pub ending: Ending,
    pub success: bool,
    /// Seconds left on the clock when the game ended.
    pub time_remaining: u64,
    /// Beats the player saw.
    pub steps: usize,
}

/// Result of a choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Turn {
    Continue(Segment),
    Over(EndingReport),
}

/// Everything a UI needs to draw the trial.
#[derive(Debug, Clone, Default)]
pub struct ControllerState {
    pub loading: bool,
    pub current: Option<Segment>,
    pub history: Vec<HistoryEntry>,
    pub game_over: bool,
    pub success: Option<bool>,
    pub ending: Option<Ending>,
    pub time_remaining: u64,
    /// Last backend failure, shown apart from in-story death.
    pub error: Option<String>,
    retry: Option<Action>,
    /// Bumped by every start so stale responses can be spotted.
    run: u64,
}

impl ControllerState {
    /// End the game. Only the first call has any effect.
    fn finish(&mut self, ending: Ending) -> bool {
        if self.game_over {
            return false;
        }
        self.game_over = true;
        self.loading = false;
        self.ending = Some(ending);
        self.success = Some(ending.is_success());
        true
    }

    pub fn report(&self) -> Option<EndingReport> {
        self.ending.map(|ending| EndingReport {
            ending,
            success: ending.is_success(),
            time_remaining: self.time_remaining,
            steps: self.history.len(),
        })
    }
}

struct Shared {
    state: Mutex<ControllerState>,
    over: watch::Sender<bool>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn finish(&self, state: &mut ControllerState, ending: Ending) -> bool {
        let first = state.finish(ending);
        if first {
            info!("Trial over: {ending:?} with {}s left", state.time_remaining);
            self.over.send_replace(true);
        }
        first
    }

    /// One countdown second. Returns false once the clock should stop.
    fn tick(&self) -> bool {
        let mut state = self.lock();
        if state.game_over {
            return false;
        }
        state.time_remaining = state.time_remaining.saturating_sub(1);
        if state.time_remaining == 0 {
            self.finish(&mut state, Ending::TimeExpired);
            return false;
        }
        true
    }
}

/// Running countdown. Stops when dropped.
pub struct Countdown {
    handle: JoinHandle<()>,
}

impl Countdown {
    pub fn stop(self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Drives one playthrough.
pub struct TrialController<B> {
    backend: B,
    session_id: SessionId,
    countdown: Duration,
    shared: Arc<Shared>,
}

impl<B: StoryBackend> TrialController<B> {
    pub fn new(backend: B, session_id: SessionId, countdown: Duration) -> Self {
        let (over, _) = watch::channel(false);
        Self {
            backend,
            session_id,
            countdown,
            shared: Arc::new(Shared {
                state: Mutex::new(ControllerState {
                    time_remaining: countdown.as_secs(),
                    ..ControllerState::default()
                }),
                over,
            }),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Copy of the current UI state.
    pub fn state(&self) -> ControllerState {
        self.shared.lock().clone()
    }

    pub fn report(&self) -> Option<EndingReport> {
        self.shared.lock().report()
    }

    /// Begin (or restart) the trial.
    pub async fn start(&self) -> Result<Segment, ControllerError> {
        let run = {
            let mut state = self.shared.lock();
            if state.loading {
                return Err(ControllerError::Busy);
            }
            let run = state.run + 1;
            *state = ControllerState {
                loading: true,
                time_remaining: self.countdown.as_secs(),
                run,
                ..ControllerState::default()
            };
            run
        };
        self.shared.over.send_replace(false);

        let result = self.backend.send(&self.session_id, Action::Start).await;

        let mut state = self.shared.lock();
        if state.run != run {
            return Err(ControllerError::GameOver);
        }
        state.loading = false;
        match result {
            Ok(segment) => {
                state.history.push(HistoryEntry {
                    narrative: segment.narrative.clone(),
                    chosen: None,
                });
                state.current = Some(segment.clone());
                Ok(segment)
            }
            Err(e) => {
                warn!("Start failed for session {}: {e}", self.session_id);
                state.error = Some(e.to_string());
                state.retry = Some(Action::Start);
                Err(e.into())
            }
        }
    }

    /// Pick option `index` of the current segment.
    pub async fn choose(&self, index: usize) -> Result<Turn, ControllerError> {
        let (run, branch) = {
            let mut state = self.shared.lock();
            if state.game_over {
                return Err(ControllerError::GameOver);
            }
            if state.loading {
                return Err(ControllerError::Busy);
            }
            let current = state.current.as_ref().ok_or(ControllerError::NotStarted)?;
            let branch = Branch::from_index(index).ok_or(ControllerError::InvalidOption(index))?;
            let text = current.option(branch).to_string();
            if let Some(last) = state.history.last_mut() {
                last.chosen = Some(text);
            }
            state.loading = true;
            state.error = None;
            state.retry = None;
            (state.run, branch)
        };

        let result = self
            .backend
            .send(&self.session_id, Action::Choose(branch))
            .await;

        let segment = {
            let mut state = self.shared.lock();
            if state.run != run {
                return Err(ControllerError::GameOver);
            }
            if state.game_over {
                debug!("Dropping response that arrived after the trial ended");
                return state
                    .report()
                    .map(Turn::Over)
                    .ok_or(ControllerError::GameOver);
            }
            match result {
                Ok(segment) => {
                    state.history.push(HistoryEntry {
                        narrative: segment.narrative.clone(),
                        chosen: None,
                    });
                    state.current = Some(segment.clone());
                    if !segment.is_terminal() {
                        state.loading = false;
                        return Ok(Turn::Continue(segment));
                    }
                    segment
                }
                Err(e) => {
                    warn!("Choice failed for session {}: {e}", self.session_id);
                    if let Some(last) = state.history.last_mut() {
                        last.chosen = None;
                    }
                    state.loading = false;
                    state.error = Some(e.to_string());
                    state.retry = Some(Action::Choose(branch));
                    return Err(e.into());
                }
            }
        };

        let query = EndingQuery::Outcome(segment.outcome.to_string());
        let success = match self.backend.check_ending(&query).await {
            Ok(success) => success,
            Err(e) => {
                warn!("Ending check failed, classifying locally: {e}");
                ending::is_success(query.text())
            }
        };

        let mut state = self.shared.lock();
        if state.run == run {
            let ending = if success { Ending::Escaped } else { Ending::Died };
            self.shared.finish(&mut state, ending);
        }
        state
            .report()
            .map(Turn::Over)
            .ok_or(ControllerError::GameOver)
    }

    /// Re-issue the action that last failed.
    pub async fn retry(&self) -> Result<Turn, ControllerError> {
        let pending = self.shared.lock().retry;
        match pending {
            Some(Action::Start) => self.start().await.map(Turn::Continue),
            Some(Action::Choose(branch)) => self.choose(branch.index()).await,
            None => Err(ControllerError::NothingToRetry),
        }
    }

    /// Start the once-per-second countdown.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_countdown(&self) -> Countdown {
        let shared = self.shared.clone();
        let handle = tokio::spawn(async move {
            let period = Duration::from_secs(1);
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                interval.tick().await;
                if !shared.tick() {
                    break;
                }
            }
        });
        Countdown { handle }
    }

    /// Resolves once the trial is over, however it ended.
    pub async fn wait_game_over(&self) -> Option<EndingReport> {
        let mut over = self.shared.over.subscribe();
        // The sender lives in `self`, so this only errors if it was dropped.
        let _ = over.wait_for(|done| *done).await;
        self.report()
    }
}
