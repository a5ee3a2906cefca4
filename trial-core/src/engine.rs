//! Story engine - turns player actions into story segments.
//!
//! For each action the engine takes the session's write lock, moves the
//! session forward, asks the generator for the next beat under a time
//! budget, substitutes fallback content when the generator can't deliver,
//! and enforces the forced-ending window. Generator trouble never reaches
//! the caller; only storage faults do.

use crate::config::{ConfigError, StoryConfig};
use crate::ending::{self, EndingQuery};
use crate::fallback::FallbackTable;
use crate::generator::{GenerationRequest, NarrativeGenerator};
use crate::segment::{Branch, Segment};
use crate::session::{Session, SessionId};
use crate::store::{SessionManager, SessionStore, StoreError};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors from the story engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid action '{0}': expected 'start', 'chooseA' or 'chooseB'")]
    InvalidAction(String),

    #[error("Session '{0}' has not started; send 'start' first")]
    NotStarted(SessionId),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),
}

/// What the player asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Choose(Branch),
}

impl FromStr for Action {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "start" => Ok(Action::Start),
            "chooseA" | "optionA" => Ok(Action::Choose(Branch::A)),
            "chooseB" | "optionB" => Ok(Action::Choose(Branch::B)),
            other => Err(EngineError::InvalidAction(other.to_string())),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Start => f.write_str("start"),
            Action::Choose(branch) => write!(f, "choose{branch}"),
        }
    }
}

/// The story engine.
pub struct StoryEngine {
    sessions: SessionManager,
    generator: Option<Arc<dyn NarrativeGenerator>>,
    fallback: FallbackTable,
    config: StoryConfig,
    rng: Mutex<StdRng>,
}

impl StoryEngine {
    /// Create an engine with an in-memory store, the built-in fallback
    /// table, and no generator.
    pub fn new(config: StoryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            sessions: SessionManager::in_memory(),
            generator: None,
            fallback: FallbackTable::builtin().clone(),
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    /// Use a generator for dynamic content.
    pub fn with_generator(mut self, generator: Arc<dyn NarrativeGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Keep sessions in a different store.
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.sessions = SessionManager::new(store);
        self
    }

    /// Replace the fallback table.
    pub fn with_fallback(mut self, fallback: FallbackTable) -> Self {
        if !fallback.covers(self.config.max_steps) {
            warn!(
                "Fallback table stops short of step {}; deeper steps use the global default",
                self.config.max_steps
            );
        }
        self.fallback = fallback;
        self
    }

    /// Seed the tie-break RNG so forced endings are reproducible.
    pub fn with_rng_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    pub fn config(&self) -> &StoryConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn fallback(&self) -> &FallbackTable {
        &self.fallback
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    /// Allocate an unstarted session under a fresh id.
    pub async fn new_session(&self) -> Result<SessionId, EngineError> {
        let id = SessionId::generate();
        self.sessions.get_or_create(&id).await?;
        Ok(id)
    }

    /// Current state of a session, creating it if needed.
    pub async fn session(&self, id: &SessionId) -> Result<Session, EngineError> {
        Ok(self.sessions.get_or_create(id).await?)
    }

    /// Apply an action to a session and return the segment to show.
    pub async fn next_segment(
        &self,
        id: &SessionId,
        action: Action,
    ) -> Result<Segment, EngineError> {
        let _guard = self.sessions.lock(id).await;
        let mut session = match (action, self.sessions.load_locked(id).await?) {
            (_, Some(session)) => session,
            (Action::Start, None) => Session::new(id.clone()),
            (Action::Choose(_), None) => return Err(EngineError::NotStarted(id.clone())),
        };

        let segment = match action {
            Action::Start => {
                let opening = self.fallback.opening().clone();
                session.begin(opening.clone());
                info!("Session {id} started");
                opening
            }
            Action::Choose(branch) => {
                if !session.is_started() {
                    return Err(EngineError::NotStarted(id.clone()));
                }
                if let Some(done) = session.current().filter(|s| s.is_terminal()) {
                    debug!("Session {id} already ended ({}); ignoring {action}", done.outcome);
                    return Ok(done.clone());
                }

                session.advance(branch);
                let force_ending = self.config.forces_ending(session.step());
                let request =
                    GenerationRequest::for_session(&session, self.config.max_steps, force_ending);

                let segment = self.resolve(&request).await;
                let segment = self.settle_outcome(&session, segment);
                if segment.is_terminal() {
                    info!(
                        "Session {id} ended at step {}: {}",
                        session.step(),
                        segment.outcome
                    );
                }
                session.record(segment.clone());
                segment
            }
        };

        self.sessions.save_locked(session).await?;
        Ok(segment)
    }

    /// Classify an ending.
    pub fn check_ending(&self, query: &EndingQuery) -> bool {
        ending::is_success(query.text())
    }

    /// Ask the generator within the time budget; fall back on any failure.
    async fn resolve(&self, request: &GenerationRequest) -> Segment {
        let key = request.key();
        let Some(generator) = &self.generator else {
            return self.fallback.lookup(key).clone();
        };

        debug!("Requesting {key} from generator '{}'", generator.name());
        match tokio::time::timeout(self.config.generation_timeout, generator.generate(request))
            .await
        {
            Ok(Ok(segment)) => segment,
            Ok(Err(e)) => {
                warn!(
                    "Generator '{}' failed for {key}, using fallback: {e}",
                    generator.name()
                );
                self.fallback.lookup(key).clone()
            }
            Err(_) => {
                warn!(
                    "Generator '{}' timed out after {:?} for {key}, using fallback",
                    generator.name(),
                    self.config.generation_timeout
                );
                self.fallback.lookup(key).clone()
            }
        }
    }

    /// Inside the ending window a non-terminal segment gets a forced outcome.
    fn settle_outcome(&self, session: &Session, segment: Segment) -> Segment {
        if !self.config.forces_ending(session.step()) || segment.is_terminal() {
            return segment;
        }
        let outcome = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            self.config
                .ending_policy
                .decide(session.branches(), &mut *rng)
        };
        debug!(
            "Forcing ending for session {} at step {}: {outcome}",
            session.id(),
            session.step()
        );
        segment.with_outcome(outcome)
    }
}
