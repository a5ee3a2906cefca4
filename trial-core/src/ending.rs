//! Endings: classifying them and forcing them.

use crate::segment::{Branch, Outcome};
use rand::Rng;

/// Words that mark an escape in free narrative text. The Spanish entries
/// keep older clients working.
const ESCAPE_KEYWORDS: &[&str] = &[
    "escaped", "escape", "exit", "outside", "escapado", "salida", "escapar", "exterior",
];

/// What the caller wants classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndingQuery {
    /// An outcome tag such as `escaped`.
    Outcome(String),
    /// Free narrative text describing where the player ended up.
    Situation(String),
}

impl EndingQuery {
    pub fn text(&self) -> &str {
        match self {
            EndingQuery::Outcome(text) | EndingQuery::Situation(text) => text,
        }
    }

    /// Whether this ending counts as a success.
    pub fn is_success(&self) -> bool {
        is_success(self.text())
    }
}

/// Whether an outcome tag or situation text describes a successful ending.
///
/// Known tags are matched exactly; anything else is searched for escape
/// keywords. Case-insensitive.
pub fn is_success(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    match lowered.parse::<Outcome>() {
        Ok(outcome) => outcome == Outcome::Escaped,
        Err(_) => ESCAPE_KEYWORDS.iter().any(|kw| lowered.contains(kw)),
    }
}

/// How a terminal outcome is picked when the story has to end and the
/// content didn't end it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndingPolicy {
    /// Fair coin between `escaped` and `death`.
    #[default]
    CoinFlip,
    /// Derived from the player's choices: more `A` picks than `B` escapes,
    /// more `B` dies, and a tie follows the final pick.
    FromChoices,
}

impl EndingPolicy {
    /// Pick a terminal outcome.
    pub fn decide<R: Rng + ?Sized>(self, branches: &[Branch], rng: &mut R) -> Outcome {
        match self {
            EndingPolicy::CoinFlip => {
                if rng.gen_bool(0.5) {
                    Outcome::Escaped
                } else {
                    Outcome::Death
                }
            }
            EndingPolicy::FromChoices => {
                let a = branches.iter().filter(|b| **b == Branch::A).count();
                let b = branches.len() - a;
                match a.cmp(&b) {
                    std::cmp::Ordering::Greater => Outcome::Escaped,
                    std::cmp::Ordering::Less => Outcome::Death,
                    std::cmp::Ordering::Equal => match branches.last() {
                        Some(Branch::B) => Outcome::Death,
                        _ => Outcome::Escaped,
                    },
                }
            }
        }
    }
}
