//! Testing utilities for the trial.
//!
//! This module provides tools for integration testing:
//! - `MockGenerator` for deterministic generation without API calls
//! - `FlakyBackend` for exercising controller error paths
//! - `TestHarness` for scripted playthroughs against a real engine
//! - Assertion helpers for verifying story state

use crate::config::StoryConfig;
use crate::controller::{BackendError, StoryBackend};
use crate::ending::EndingQuery;
use crate::engine::{Action, EngineError, StoryEngine};
use crate::generator::{GenerationRequest, GeneratorError, NarrativeGenerator};
use crate::segment::{Branch, Segment};
use crate::session::{Session, SessionId};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A scripted reply from the mock generator.
#[derive(Debug, Clone)]
pub enum MockReply {
    Segment(Segment),
    Fail(String),
}

impl MockReply {
    fn into_result(self) -> Result<Segment, GeneratorError> {
        match self {
            MockReply::Segment(segment) => Ok(segment),
            MockReply::Fail(reason) => Err(GeneratorError::Unavailable(reason)),
        }
    }
}

/// A generator that returns scripted replies.
///
/// Queued replies are used first, in order. After that the `always` reply
/// is repeated if set; otherwise the generator reports itself unavailable.
#[derive(Default)]
pub struct MockGenerator {
    queue: Mutex<VecDeque<MockReply>>,
    always: Option<MockReply>,
    delay: Option<Duration>,
    requests: Mutex<Vec<GenerationRequest>>,
    /// Calls that ran to completion (were not cancelled mid-delay).
    completed: AtomicUsize,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the same segment for every call.
    pub fn always(segment: Segment) -> Self {
        Self {
            always: Some(MockReply::Segment(segment)),
            ..Self::default()
        }
    }

    /// Fail every call.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            always: Some(MockReply::Fail(reason.into())),
            ..Self::default()
        }
    }

    /// Queue a segment.
    pub fn respond(self, segment: Segment) -> Self {
        self.push(MockReply::Segment(segment));
        self
    }

    /// Queue a failure.
    pub fn fail(self, reason: impl Into<String>) -> Self {
        self.push(MockReply::Fail(reason.into()));
        self
    }

    /// Sleep before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn push(&self, reply: MockReply) {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of calls made.
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Number of calls that produced a reply.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NarrativeGenerator for MockGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Segment, GeneratorError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);

        let queued = self
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match queued.or_else(|| self.always.clone()) {
            Some(reply) => reply.into_result(),
            None => Err(GeneratorError::Unavailable(
                "no scripted replies left".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Wraps a backend and fails a set number of sends first.
pub struct FlakyBackend<B> {
    inner: B,
    failures: AtomicUsize,
}

impl<B: StoryBackend> FlakyBackend<B> {
    pub fn new(inner: B, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
        }
    }

    /// Fail the next `count` sends.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }
}

#[async_trait]
impl<B: StoryBackend> StoryBackend for FlakyBackend<B> {
    async fn send(&self, session_id: &SessionId, action: Action) -> Result<Segment, BackendError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BackendError::Failed("connection reset".to_string()));
        }
        self.inner.send(session_id, action).await
    }

    async fn check_ending(&self, query: &EndingQuery) -> Result<bool, BackendError> {
        self.inner.check_ending(query).await
    }
}

/// Test harness for scripted playthroughs.
pub struct TestHarness {
    pub engine: StoryEngine,
    pub session_id: SessionId,
}

impl TestHarness {
    /// Engine with default config, no generator, and a fixed tie-break seed.
    pub fn new() -> Self {
        Self::with_config(StoryConfig::default())
    }

    pub fn with_config(config: StoryConfig) -> Self {
        let engine = match StoryEngine::new(config) {
            Ok(engine) => engine,
            Err(e) => panic!("invalid test config: {e}"),
        };
        Self {
            engine: engine.with_rng_seed(7),
            session_id: SessionId::generate(),
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn NarrativeGenerator>) -> Self {
        self.engine = self.engine.with_generator(generator);
        self
    }

    pub async fn start(&self) -> Result<Segment, EngineError> {
        self.engine
            .next_segment(&self.session_id, Action::Start)
            .await
    }

    pub async fn choose(&self, branch: Branch) -> Result<Segment, EngineError> {
        self.engine
            .next_segment(&self.session_id, Action::Choose(branch))
            .await
    }

    /// Pick branches in order, returning every segment served.
    pub async fn play(&self, branches: &[Branch]) -> Result<Vec<Segment>, EngineError> {
        let mut segments = Vec::with_capacity(branches.len());
        for &branch in branches {
            segments.push(self.choose(branch).await?);
        }
        Ok(segments)
    }

    pub async fn session(&self) -> Session {
        match self.engine.session(&self.session_id).await {
            Ok(session) => session,
            Err(e) => panic!("session lookup failed: {e}"),
        }
    }

    pub async fn step(&self) -> u32 {
        self.session().await.step()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert a segment ends the story.
#[track_caller]
pub fn assert_terminal(segment: &Segment) {
    assert!(
        segment.is_terminal(),
        "Expected a terminal segment, got '{}' at '{}'",
        segment.outcome,
        segment.narrative
    );
}

/// Assert a segment keeps the story going.
#[track_caller]
pub fn assert_continues(segment: &Segment) {
    assert!(
        !segment.is_terminal(),
        "Expected the story to continue, got '{}' at '{}'",
        segment.outcome,
        segment.narrative
    );
}

/// Assert the session is at the given step.
#[track_caller]
pub fn assert_step(session: &Session, step: u32) {
    assert_eq!(
        session.step(),
        step,
        "Expected session {} at step {step}, got {}",
        session.id(),
        session.step()
    );
}
