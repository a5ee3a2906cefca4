//! Story segments and the small vocabulary around them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix applied to narratives that arrive without a terminal-style header.
pub const DEFAULT_PREFIX: &str = "> SYSTEM: ";

/// One of the two forward choices at a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Branch {
    A,
    B,
}

impl Branch {
    /// Index into a segment's options.
    pub fn index(self) -> usize {
        match self {
            Branch::A => 0,
            Branch::B => 1,
        }
    }

    /// Branch selected by an option index, if the index is valid.
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Branch::A),
            1 => Some(Branch::B),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Branch::A => 'A',
            Branch::B => 'B',
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// How a segment leaves the story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    #[default]
    Continue,
    Escaped,
    Death,
}

impl Outcome {
    /// Whether the story ends with this segment.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Outcome::Continue)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Continue => "continue",
            Outcome::Escaped => "escaped",
            Outcome::Death => "death",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for unrecognized outcome tags.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown outcome '{0}'")]
pub struct UnknownOutcome(pub String);

impl FromStr for Outcome {
    type Err = UnknownOutcome;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(Outcome::Continue),
            "escaped" => Ok(Outcome::Escaped),
            "death" => Ok(Outcome::Death),
            other => Err(UnknownOutcome(other.to_string())),
        }
    }
}

/// A labelled choice shown to the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryOption {
    pub text: String,
}

impl StoryOption {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// One narrative beat: text, exactly two options, and an outcome tag.
///
/// Once the outcome is terminal the option labels are flavour text only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub narrative: String,
    pub options: [StoryOption; 2],
    pub outcome: Outcome,
}

impl Segment {
    /// Build a segment from its parts.
    pub fn new(
        narrative: impl Into<String>,
        option_a: impl Into<String>,
        option_b: impl Into<String>,
        outcome: Outcome,
    ) -> Self {
        Self {
            narrative: narrative.into(),
            options: [StoryOption::new(option_a), StoryOption::new(option_b)],
            outcome,
        }
    }

    /// The label of the option behind a branch.
    pub fn option(&self, branch: Branch) -> &str {
        &self.options[branch.index()].text
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_terminal()
    }

    /// Replace the outcome tag, keeping text and options.
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Make sure the narrative opens with a `>` terminal header.
    pub fn ensure_terminal_prefix(mut self) -> Self {
        if !self.narrative.trim_start().starts_with('>') {
            self.narrative = format!("{DEFAULT_PREFIX}{}", self.narrative.trim_start());
        }
        self
    }
}

/// Position in the story tree: the step and the branch that led to it.
///
/// The opening step has no branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BranchKey {
    pub step: u32,
    pub branch: Option<Branch>,
}

impl BranchKey {
    pub fn new(step: u32, branch: Option<Branch>) -> Self {
        Self { step, branch }
    }
}

impl fmt::Display for BranchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.branch {
            Some(branch) => write!(f, "step{}{}", self.step, branch.letter().to_ascii_lowercase()),
            None => write!(f, "step{}", self.step),
        }
    }
}
