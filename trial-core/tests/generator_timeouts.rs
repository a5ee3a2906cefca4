//! Generator time budget and late-result handling.
//!
//! Time is paused, so these run instantly while exercising real timers.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use trial_core::segment::{Branch, BranchKey, Outcome, Segment};
use trial_core::testing::{assert_step, MockGenerator};
use trial_core::{StoryConfig, TestHarness};

fn generated(text: &str) -> Segment {
    Segment::new(text, "Go on", "Turn back", Outcome::Continue)
}

#[tokio::test(start_paused = true)]
async fn test_slow_generator_falls_back_after_timeout() {
    let generator = Arc::new(
        MockGenerator::always(generated("> SYSTEM ALERT: too late")).with_delay(Duration::from_secs(10)),
    );
    let harness = TestHarness::new().with_generator(generator.clone());
    harness.start().await.unwrap();

    let began = Instant::now();
    let segment = harness.choose(Branch::A).await.unwrap();
    let waited = began.elapsed();

    assert!(waited >= Duration::from_secs(5), "returned after {waited:?}");
    assert!(waited < Duration::from_secs(10), "returned after {waited:?}");

    let expected = harness
        .engine
        .fallback()
        .lookup(BranchKey::new(2, Some(Branch::A)))
        .clone();
    assert_eq!(segment, expected);
    assert_eq!(generator.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_late_result_is_never_applied() {
    let generator = Arc::new(
        MockGenerator::always(generated("> SYSTEM ALERT: too late")).with_delay(Duration::from_secs(10)),
    );
    let harness = TestHarness::new().with_generator(generator.clone());
    harness.start().await.unwrap();
    let served = harness.choose(Branch::B).await.unwrap();

    // Well past the point the slow call would have finished.
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(generator.completed(), 0);
    let session = harness.session().await;
    assert_step(&session, 2);
    assert_eq!(session.current(), Some(&served));
    assert_ne!(served.narrative, "> SYSTEM ALERT: too late");
}

#[tokio::test(start_paused = true)]
async fn test_generator_within_budget_is_used() {
    let generator = Arc::new(
        MockGenerator::always(generated("> SYSTEM ALERT: in time")).with_delay(Duration::from_secs(4)),
    );
    let harness = TestHarness::new().with_generator(generator.clone());
    harness.start().await.unwrap();

    let segment = harness.choose(Branch::A).await.unwrap();
    assert_eq!(segment.narrative, "> SYSTEM ALERT: in time");
    assert_eq!(generator.completed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_custom_timeout() {
    let generator = Arc::new(
        MockGenerator::always(generated("> SYSTEM ALERT: slow")).with_delay(Duration::from_secs(4)),
    );
    let config = StoryConfig::new().with_generation_timeout(Duration::from_secs(2));
    let harness = TestHarness::with_config(config).with_generator(generator.clone());
    harness.start().await.unwrap();

    let segment = harness.choose(Branch::A).await.unwrap();
    assert_ne!(segment.narrative, "> SYSTEM ALERT: slow");
    assert_eq!(generator.completed(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_in_ending_window_still_ends() {
    let generator = Arc::new(
        MockGenerator::always(generated("> SYSTEM ALERT: slow")).with_delay(Duration::from_secs(60)),
    );
    let config = StoryConfig::new().with_max_steps(3);
    let harness = TestHarness::with_config(config).with_generator(generator);
    harness.start().await.unwrap();

    let segments = harness.play(&[Branch::A, Branch::A]).await.unwrap();
    assert!(!segments[0].is_terminal());
    assert!(segments[1].is_terminal());
}
