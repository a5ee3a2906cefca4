//! Trial of Fire story engine.
//!
//! This crate provides:
//! - Per-session story state with serialized access
//! - Generated story beats with a time budget and deterministic fallback
//! - A forced-ending window so every playthrough terminates
//! - A client controller with a countdown for front ends
//!
//! # Quick Start
//!
//! ```ignore
//! use trial_core::{Action, SessionId, StoryConfig, StoryEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = StoryEngine::new(StoryConfig::default())?;
//!     let id = SessionId::generate();
//!
//!     let opening = engine.next_segment(&id, Action::Start).await?;
//!     println!("{}", opening.narrative);
//!
//!     let next = engine.next_segment(&id, "chooseA".parse()?).await?;
//!     println!("{}", next.narrative);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod controller;
pub mod ending;
pub mod engine;
pub mod fallback;
pub mod generator;
pub mod segment;
pub mod session;
pub mod store;
pub mod testing;

// Primary public API
pub use config::{ConfigError, StoryConfig};
pub use controller::{
    BackendError, ControllerError, ControllerState, Countdown, Ending, EndingReport,
    HistoryEntry, StoryBackend, TrialController, Turn,
};
pub use ending::{EndingPolicy, EndingQuery};
pub use engine::{Action, EngineError, StoryEngine};
pub use fallback::FallbackTable;
pub use generator::{ClaudeGenerator, GenerationRequest, GeneratorError, NarrativeGenerator};
pub use segment::{Branch, BranchKey, Outcome, Segment, StoryOption};
pub use session::{Session, SessionId};
pub use store::{MemoryStore, SessionManager, SessionStore, StoreError};
pub use testing::{MockGenerator, TestHarness};
