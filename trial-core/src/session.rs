//! Session - one player's playthrough of the trial.
//!
//! A session tracks the current step, the branch that led there, and the
//! narrative and choice history the generator needs for continuity. The
//! session only changes through the methods here so the step and history
//! invariants hold everywhere.

use crate::segment::{Branch, BranchKey, Segment};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a caller-supplied id. Returns `None` for blank ids.
    pub fn parse(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A player's progress through the story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    step: u32,
    last_choice: Option<Branch>,
    narrative_history: Vec<String>,
    choice_history: Vec<String>,
    branches: Vec<Branch>,
    /// Segment most recently served for this session.
    current: Option<Segment>,
}

impl Session {
    /// Create a session that has not started yet (step 0).
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            step: 0,
            last_choice: None,
            narrative_history: Vec::new(),
            choice_history: Vec::new(),
            branches: Vec::new(),
            current: None,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Current 1-based step, or 0 before the story starts.
    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn last_choice(&self) -> Option<Branch> {
        self.last_choice
    }

    pub fn narrative_history(&self) -> &[String] {
        &self.narrative_history
    }

    pub fn choice_history(&self) -> &[String] {
        &self.choice_history
    }

    pub fn current(&self) -> Option<&Segment> {
        self.current.as_ref()
    }

    pub fn is_started(&self) -> bool {
        self.step > 0
    }

    /// Whether the last served segment ended the story.
    pub fn is_finished(&self) -> bool {
        self.current.as_ref().is_some_and(Segment::is_terminal)
    }

    /// Position in the story tree.
    pub fn key(&self) -> BranchKey {
        BranchKey::new(self.step, self.last_choice)
    }

    /// Branches chosen so far, oldest first.
    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    /// Back to step 0 with empty history.
    pub fn reset(&mut self) {
        self.step = 0;
        self.last_choice = None;
        self.narrative_history.clear();
        self.choice_history.clear();
        self.branches.clear();
        self.current = None;
    }

    /// Reset and move to the opening step.
    pub fn begin(&mut self, opening: Segment) {
        self.reset();
        self.step = 1;
        self.current = Some(opening);
    }

    /// Take a branch: fold the current segment into history and move one
    /// step forward.
    ///
    /// Before the story starts there is no segment to fold in, so only the
    /// step moves.
    pub fn advance(&mut self, branch: Branch) {
        if let Some(segment) = self.current.take() {
            self.narrative_history.push(segment.narrative.clone());
            self.choice_history.push(segment.option(branch).to_string());
        }
        self.step += 1;
        self.last_choice = Some(branch);
        self.branches.push(branch);
    }

    /// Record the segment served for the current step.
    pub fn record(&mut self, segment: Segment) {
        self.current = Some(segment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Outcome;

    fn segment(text: &str) -> Segment {
        Segment::new(text, format!("{text}-a"), format!("{text}-b"), Outcome::Continue)
    }

    #[test]
    fn test_session_id_parse() {
        assert!(SessionId::parse("   ").is_none());
        assert_eq!(SessionId::parse(" s1 ").unwrap().as_str(), "s1");
        assert_ne!(SessionId::generate(), SessionId::generate());
    }

    #[test]
    fn test_history_tracks_step() {
        let mut session = Session::new(SessionId::parse("s1").unwrap());
        assert_eq!(session.step(), 0);

        session.begin(segment("one"));
        assert_eq!(session.step(), 1);
        assert!(session.narrative_history().is_empty());

        session.advance(Branch::B);
        session.record(segment("two"));
        session.advance(Branch::A);

        assert_eq!(session.step(), 3);
        assert_eq!(session.narrative_history(), ["one", "two"]);
        assert_eq!(session.choice_history(), ["one-b", "two-a"]);
        assert_eq!(session.last_choice(), Some(Branch::A));
        assert_eq!(session.branches(), [Branch::B, Branch::A]);
        assert_eq!(
            session.narrative_history().len() as u32,
            session.step() - 1
        );
    }

    #[test]
    fn test_begin_clears_previous_run() {
        let mut session = Session::new(SessionId::parse("s1").unwrap());
        session.begin(segment("one"));
        session.advance(Branch::A);
        session.record(segment("end").with_outcome(Outcome::Death));
        assert!(session.is_finished());

        session.begin(segment("again"));
        assert_eq!(session.step(), 1);
        assert!(!session.is_finished());
        assert!(session.choice_history().is_empty());
        assert_eq!(session.last_choice(), None);
    }
}
