//! Client controller: countdown, endings, and error recovery.

use std::sync::Arc;
use std::time::Duration;
use trial_core::controller::{ControllerError, Ending, TrialController, Turn};
use trial_core::segment::{Outcome, Segment};
use trial_core::testing::{FlakyBackend, MockGenerator};
use trial_core::{SessionId, StoryConfig, StoryEngine};

fn engine() -> StoryEngine {
    StoryEngine::new(StoryConfig::default())
        .unwrap()
        .with_rng_seed(3)
}

fn slow_engine(delay: Duration) -> StoryEngine {
    let generator = MockGenerator::always(Segment::new(
        "> SYSTEM ALERT: footsteps behind you",
        "Run",
        "Freeze",
        Outcome::Continue,
    ))
    .with_delay(delay);
    StoryEngine::new(StoryConfig::new().with_generation_timeout(Duration::from_secs(30)))
        .unwrap()
        .with_generator(Arc::new(generator))
}

fn controller<B: trial_core::StoryBackend>(backend: B, countdown: u64) -> TrialController<B> {
    TrialController::new(
        backend,
        SessionId::generate(),
        Duration::from_secs(countdown),
    )
}

// =============================================================================
// Countdown
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_countdown_expires_during_choice() {
    let controller = controller(slow_engine(Duration::from_secs(10)), 5);
    let opening = controller.start().await.unwrap();
    let _countdown = controller.start_countdown();

    let turn = controller.choose(0).await.unwrap();
    let Turn::Over(report) = turn else {
        panic!("expected the trial to be over, got {turn:?}");
    };
    assert_eq!(report.ending, Ending::TimeExpired);
    assert!(!report.success);
    assert_eq!(report.time_remaining, 0);

    let state = controller.state();
    assert!(state.game_over);
    assert!(!state.loading);
    assert_eq!(state.ending, Some(Ending::TimeExpired));
    assert_eq!(state.current, Some(opening));
    assert_eq!(state.history.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_countdown_ticks_once_per_second() {
    let controller = controller(engine(), 300);
    controller.start().await.unwrap();
    let _countdown = controller.start_countdown();

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(controller.state().time_remaining, 297);
}

#[tokio::test(start_paused = true)]
async fn test_wait_game_over_on_expiry() {
    let controller = controller(engine(), 3);
    controller.start().await.unwrap();
    let countdown = controller.start_countdown();

    let report = controller.wait_game_over().await.unwrap();
    assert_eq!(report.ending, Ending::TimeExpired);
    tokio::task::yield_now().await;
    assert!(countdown.is_finished());
}

#[tokio::test(start_paused = true)]
async fn test_escape_stops_the_clock() {
    let controller = controller(engine(), 300);
    controller.start().await.unwrap();
    let _countdown = controller.start_countdown();

    let mut last = None;
    for _ in 0..7 {
        last = Some(controller.choose(0).await.unwrap());
    }
    let Some(Turn::Over(report)) = last else {
        panic!("expected the trial to be over, got {last:?}");
    };
    assert_eq!(report.ending, Ending::Escaped);
    assert!(report.success);
    assert_eq!(report.steps, 8);

    let left = controller.state().time_remaining;
    tokio::time::sleep(Duration::from_secs(600)).await;
    let state = controller.state();
    assert_eq!(state.ending, Some(Ending::Escaped));
    assert_eq!(state.time_remaining, left);
}

#[tokio::test(start_paused = true)]
async fn test_death_ending() {
    let controller = controller(engine(), 300);
    controller.start().await.unwrap();
    for _ in 0..6 {
        controller.choose(0).await.unwrap();
    }
    let turn = controller.choose(1).await.unwrap();
    assert!(matches!(turn, Turn::Over(r) if r.ending == Ending::Died && !r.success));
    assert_eq!(controller.choose(0).await, Err(ControllerError::GameOver));
}

// =============================================================================
// Request handling
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_second_choice_while_loading_is_busy() {
    let controller = controller(slow_engine(Duration::from_secs(2)), 300);
    controller.start().await.unwrap();

    let (first, second) = tokio::join!(controller.choose(0), controller.choose(1));
    assert!(matches!(first, Ok(Turn::Continue(_))));
    assert_eq!(second, Err(ControllerError::Busy));
}

#[tokio::test]
async fn test_retry_after_failed_start() {
    let controller = controller(FlakyBackend::new(engine(), 1), 300);

    let err = controller.start().await.unwrap_err();
    assert!(matches!(err, ControllerError::Backend(_)));
    assert!(controller.state().error.is_some());

    let turn = controller.retry().await.unwrap();
    assert!(matches!(turn, Turn::Continue(_)));
    let state = controller.state();
    assert!(state.error.is_none());
    assert_eq!(state.history.len(), 1);
}

#[tokio::test]
async fn test_failed_choice_rolls_back_and_retries() {
    let backend = FlakyBackend::new(engine(), 0);
    let controller = controller(backend, 300);
    let opening = controller.start().await.unwrap();

    controller.backend().fail_next(1);
    assert!(controller.choose(1).await.is_err());

    let state = controller.state();
    assert!(!state.loading);
    assert_eq!(state.history.len(), 1);
    assert_eq!(state.history[0].chosen, None);
    assert_eq!(state.current.as_ref(), Some(&opening));

    let turn = controller.retry().await.unwrap();
    assert!(matches!(turn, Turn::Continue(_)));
    let state = controller.state();
    assert_eq!(state.history.len(), 2);
    assert_eq!(
        state.history[0].chosen.as_deref(),
        Some(opening.options[1].text.as_str())
    );
}
