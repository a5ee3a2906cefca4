//! Story configuration.

use crate::ending::EndingPolicy;
use std::time::Duration;
use thiserror::Error;

/// Default number of steps before the story is forced to end.
pub const DEFAULT_MAX_STEPS: u32 = 8;

/// Default budget for one generator call.
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default length of the player's countdown.
pub const DEFAULT_COUNTDOWN: Duration = Duration::from_secs(300);

/// Invalid configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_steps must be at least 2, got {0}")]
    TooFewSteps(u32),

    #[error("ending_threshold {threshold} must be between 2 and max_steps ({max_steps})")]
    ThresholdOutOfRange { threshold: u32, max_steps: u32 },

    #[error("generation_timeout must be non-zero")]
    ZeroTimeout,

    #[error("countdown must be at least one second")]
    ZeroCountdown,
}

/// Tunables for the story engine and the player's clock.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryConfig {
    /// Step at which the story must have ended (N).
    pub max_steps: u32,

    /// First step of the forced-ending window. Never above `max_steps`.
    pub ending_threshold: u32,

    /// Budget for one generator call before fallback content is used.
    pub generation_timeout: Duration,

    /// Tie-break used when an ending has to be forced.
    pub ending_policy: EndingPolicy,

    /// Time the player has to finish.
    pub countdown: Duration,
}

impl Default for StoryConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            ending_threshold: DEFAULT_MAX_STEPS,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            ending_policy: EndingPolicy::default(),
            countdown: DEFAULT_COUNTDOWN,
        }
    }
}

impl StoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set N. A threshold still sitting at the old N moves with it; an
    /// earlier one is kept, clamped so it never starts after N.
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        let follows_max = self.ending_threshold >= self.max_steps;
        self.max_steps = max_steps;
        self.ending_threshold = if follows_max {
            max_steps
        } else {
            self.ending_threshold.min(max_steps)
        };
        self
    }

    /// Start forcing endings earlier than N.
    pub fn with_ending_threshold(mut self, threshold: u32) -> Self {
        self.ending_threshold = threshold;
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    pub fn with_ending_policy(mut self, policy: EndingPolicy) -> Self {
        self.ending_policy = policy;
        self
    }

    pub fn with_countdown(mut self, countdown: Duration) -> Self {
        self.countdown = countdown;
        self
    }

    /// Whether a step falls in the forced-ending window.
    pub fn forces_ending(&self, step: u32) -> bool {
        step >= self.ending_threshold
    }

    /// Check the values make a playable story.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_steps < 2 {
            return Err(ConfigError::TooFewSteps(self.max_steps));
        }
        if self.ending_threshold < 2 || self.ending_threshold > self.max_steps {
            return Err(ConfigError::ThresholdOutOfRange {
                threshold: self.ending_threshold,
                max_steps: self.max_steps,
            });
        }
        if self.generation_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.countdown < Duration::from_secs(1) {
            return Err(ConfigError::ZeroCountdown);
        }
        Ok(())
    }
}
