//! Narrative generation.
//!
//! The engine only sees [`NarrativeGenerator`]: a request goes in, a segment
//! or an error comes out. Any text backend can sit behind it; the shipped
//! one talks to Claude.

mod claude;

pub use claude::{parse_segment, ClaudeGenerator, GeneratorConfig};

use crate::segment::{Branch, BranchKey, Segment};
use crate::session::Session;
use async_trait::async_trait;
use thiserror::Error;

/// Errors from a generator. All of them are recoverable by the engine.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Generator API error: {0}")]
    Api(#[from] ::claude::Error),

    #[error("Malformed generator payload: {0}")]
    Malformed(String),

    #[error("Generator unavailable: {0}")]
    Unavailable(String),
}

/// Everything a generator needs to write the next beat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Narratives served so far, oldest first.
    pub narrative_history: Vec<String>,
    /// Option labels picked so far, oldest first.
    pub choice_history: Vec<String>,
    /// Step being generated.
    pub step: u32,
    /// Branch that led to this step.
    pub branch: Option<Branch>,
    /// Maximum number of steps in the story.
    pub max_steps: u32,
    /// The segment must end the story.
    pub force_ending: bool,
}

impl GenerationRequest {
    /// Snapshot a session that has just advanced to the step to generate.
    pub fn for_session(session: &Session, max_steps: u32, force_ending: bool) -> Self {
        Self {
            narrative_history: session.narrative_history().to_vec(),
            choice_history: session.choice_history().to_vec(),
            step: session.step(),
            branch: session.last_choice(),
            max_steps,
            force_ending,
        }
    }

    pub fn key(&self) -> BranchKey {
        BranchKey::new(self.step, self.branch)
    }
}

/// A source of story segments.
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    /// Write the segment for the requested step.
    async fn generate(&self, request: &GenerationRequest) -> Result<Segment, GeneratorError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}
