//! Integration tests for the reconnection protocol.
//!
//! Uses tokio's paused clock to verify:
//! - fixed-delay retry cadence and error suppression while reconnecting
//! - stop cancelling a scheduled or in-flight retry
//! - giving up (attempt limit, fatal engine error) surfacing exactly once
//! - screen audio restored at most once per downgrade, never after stop

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use sc_test_utils::{init_test_tracing, test_config, EngineCall, MockPrompt, TestHarness};
use stream_controller::collaborators::{AudioSourceKind, EngineEvent, MediaEngine, VideoSourceKind};
use stream_controller::errors::EngineError;
use stream_controller::session::{Phase, SessionStatus, StartOutcome};
use stream_controller::ScError;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn refused() -> EngineError {
    EngineError::Transport("connection refused".to_string())
}

// ============================================================================
// Retry cadence
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_start_failure_retries_on_fixed_cadence() {
    init_test_tracing();
    let h = TestHarness::builder().build();
    h.engine.set_start_always_fails(Some(refused()));

    let outcome = h.controller.start().await.unwrap();
    assert_eq!(outcome, StartOutcome::Reconnecting);
    assert_eq!(h.controller.phase(), Phase::Connecting { is_retry: true });
    assert_eq!(h.engine.count(EngineCall::Open), 1);

    h.advance(ms(4900)).await;
    assert_eq!(h.engine.count(EngineCall::Open), 1);

    h.advance(ms(200)).await;
    assert_eq!(h.engine.count(EngineCall::Open), 2);

    h.advance(ms(5000)).await;
    assert_eq!(h.engine.count(EngineCall::Open), 3);
    assert_eq!(h.controller.reconnect_attempts(), 2);

    // Failures during the outage stay quiet.
    assert!(h.sink.errors().is_empty());
    let messages = h.sink.messages();
    assert!(messages.contains(&"Reconnecting (attempt 1)".to_string()));
    assert!(messages.contains(&"Reconnecting (attempt 2)".to_string()));

    h.engine.set_start_always_fails(None);
    h.advance(ms(5000)).await;

    assert_eq!(h.controller.phase(), Phase::Streaming);
    assert_eq!(h.controller.reconnect_attempts(), 0);
    assert!(h.sink.messages().contains(&"Reconnected".to_string()));
    assert!(h.sink.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_connection_loss_while_streaming_reconnects() {
    let h = TestHarness::builder().build();
    h.controller.start().await.unwrap();

    h.engine.drop_connection("network down");
    h.advance(ms(50)).await;

    assert!(h.controller.phase().is_reconnecting());
    assert_eq!(h.controller.status(), SessionStatus::Connecting);
    assert_eq!(h.engine.count(EngineCall::Close), 1);
    assert!(h
        .sink
        .messages()
        .contains(&"Connection lost, reconnecting in 5s".to_string()));

    h.advance(Duration::from_secs(5)).await;

    assert_eq!(h.controller.phase(), Phase::Streaming);
    assert_eq!(h.engine.count(EngineCall::Open), 2);
    assert!(h.sink.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_streaming_flag_drop_triggers_reconnect() {
    let h = TestHarness::builder().build();
    h.controller.start().await.unwrap();

    h.engine.stop_reporting_streaming();
    h.advance(ms(50)).await;

    assert!(h.controller.phase().is_reconnecting());
}

#[tokio::test(start_paused = true)]
async fn test_auto_reconnect_disabled_surfaces_error() {
    let mut config = test_config();
    config.auto_reconnect = false;
    let h = TestHarness::builder().config(config).build();
    h.engine.set_start_always_fails(Some(refused()));

    let result = h.controller.start().await;

    assert!(matches!(result, Err(ScError::Connection(_))));
    assert_eq!(h.controller.phase(), Phase::Idle);
    assert_eq!(h.sink.errors().len(), 1);

    h.advance(Duration::from_secs(10)).await;
    assert_eq!(h.engine.count(EngineCall::Open), 1);
}

// ============================================================================
// Stop wins
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_scheduled_retry() {
    let h = TestHarness::builder().build();
    h.engine.set_start_always_fails(Some(refused()));
    h.controller.start().await.unwrap();

    h.controller.stop().await;
    assert_eq!(h.controller.phase(), Phase::Idle);

    h.advance(Duration::from_secs(30)).await;

    assert_eq!(h.engine.count(EngineCall::Open), 1);
    assert_eq!(h.controller.phase(), Phase::Idle);
    assert!(h.sink.errors().is_empty());
    assert_eq!(h.sink.statuses().last(), Some(&SessionStatus::Idle));
}

#[tokio::test(start_paused = true)]
async fn test_stop_aborts_in_flight_retry() {
    let h = TestHarness::builder().build();
    h.controller.start().await.unwrap();

    h.engine.set_open_delay(ms(1000));
    h.engine.drop_connection("network down");
    h.advance(ms(5500)).await;
    assert_eq!(h.engine.count(EngineCall::Open), 2);

    h.controller.stop().await;
    assert_eq!(h.controller.phase(), Phase::Idle);

    h.advance(Duration::from_secs(30)).await;
    assert_eq!(h.engine.count(EngineCall::Open), 2);
    assert!(h.sink.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_reconnect_teardown_leaves_no_retry() {
    let h = TestHarness::builder().build();
    h.controller.start().await.unwrap();

    // Teardown holds the session while stop_stream drags on.
    h.engine.set_stop_delay(ms(1000));
    h.engine
        .emit(EngineEvent::ConnectionLost("network down".to_string()));
    h.advance(ms(100)).await;
    assert!(h.controller.phase().is_reconnecting());

    h.controller.stop().await;

    assert_eq!(h.controller.phase(), Phase::Idle);
    assert!(!h.controller.is_reconnect_scheduled());
    h.advance(Duration::from_secs(30)).await;
    assert_eq!(h.engine.count(EngineCall::Open), 1);
    assert!(!h
        .sink
        .messages()
        .iter()
        .any(|m| m.starts_with("Reconnecting (attempt")));
}

// ============================================================================
// Giving up
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_retry_limit_surfaces_once() {
    let mut config = test_config();
    config.max_reconnect_attempts = Some(2);
    let h = TestHarness::builder().config(config).build();
    h.engine.set_start_always_fails(Some(refused()));

    h.controller.start().await.unwrap();
    h.advance(Duration::from_secs(11)).await;

    let errors = h.sink.errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors.first(), Some(ScError::RetriesExhausted(2))));
    assert_eq!(h.controller.phase(), Phase::Idle);

    h.advance(Duration::from_secs(20)).await;
    assert_eq!(h.engine.count(EngineCall::Open), 3);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_error_during_reconnect_abandons() {
    let h = TestHarness::builder().build();
    h.controller.start().await.unwrap();

    h.engine
        .fail_next_opens(1, EngineError::Fatal("encoder crashed".to_string()));
    h.engine.drop_connection("network down");
    h.advance(ms(5100)).await;

    let errors = h.sink.errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors.first(), Some(ScError::EngineFatal(_))));
    assert_eq!(h.controller.phase(), Phase::Idle);

    h.advance(Duration::from_secs(20)).await;
    assert_eq!(h.engine.count(EngineCall::Open), 2);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_error_with_hung_stop_stream_still_goes_idle() {
    let h = TestHarness::builder().build();
    h.controller.start().await.unwrap();
    h.engine.set_stop_delay(Duration::from_secs(60));

    h.engine
        .emit(EngineEvent::Fatal("encoder crashed".to_string()));
    h.advance(Duration::from_secs(10)).await;

    assert_eq!(h.controller.phase(), Phase::Idle);
    let errors = h.sink.errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors.first(), Some(ScError::EngineFatal(_))));
    assert_eq!(h.engine.count(EngineCall::Close), 1);
}

// ============================================================================
// Audio and mute across reconnects
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_screen_audio_restored_once_after_reconnect() {
    let h = TestHarness::builder().build();
    let prompt = MockPrompt::granting();
    h.controller.start().await.unwrap();

    h.controller
        .switch_video_source(VideoSourceKind::Relay, Some(prompt.handle()))
        .await
        .unwrap();
    h.advance(ms(100)).await;
    assert_eq!(h.engine.screen_audio_sets(), 1);
    assert_eq!(
        h.engine.audio_source(),
        Some(AudioSourceKind::ScreenAudioCapture)
    );

    h.engine.drop_connection("network down");
    h.advance(ms(100)).await;
    assert_eq!(h.engine.audio_source(), Some(AudioSourceKind::Microphone));
    assert!(!h.broker.holds_token());

    h.advance(Duration::from_secs(5)).await;
    assert_eq!(h.controller.phase(), Phase::Streaming);
    assert_eq!(h.engine.screen_audio_sets(), 2);
    assert_eq!(prompt.capture_requests(), 2);

    h.advance(Duration::from_secs(30)).await;
    assert_eq!(h.engine.screen_audio_sets(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_screen_audio_not_restored_after_stop() {
    let h = TestHarness::builder().build();
    let prompt = MockPrompt::granting();
    h.controller.start().await.unwrap();
    h.controller
        .switch_video_source(VideoSourceKind::Relay, Some(prompt.handle()))
        .await
        .unwrap();
    h.advance(ms(100)).await;

    h.engine.drop_connection("network down");
    h.advance(ms(100)).await;
    h.controller.stop().await;

    assert_eq!(h.controller.start().await.unwrap(), StartOutcome::Streaming);
    h.advance(Duration::from_secs(30)).await;

    assert_eq!(h.engine.screen_audio_sets(), 1);
    assert_eq!(prompt.capture_requests(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_mute_reapplied_after_reconnect() {
    let h = TestHarness::builder().build();
    h.controller.set_muted(true);
    h.controller.start().await.unwrap();

    h.engine.drop_connection("network down");
    h.advance(Duration::from_secs(6)).await;

    assert_eq!(h.controller.phase(), Phase::Streaming);
    assert!(h.controller.is_muted());
    assert_eq!(h.engine.count(EngineCall::Muted(true)), 3);
}

#[tokio::test(start_paused = true)]
async fn test_stop_not_blocked_by_unanswered_capture_prompt() {
    let h = TestHarness::builder().build();
    let prompt = MockPrompt::granting();
    prompt.stop_answering_after(1);
    h.controller.start().await.unwrap();
    h.controller
        .switch_video_source(VideoSourceKind::Relay, Some(prompt.handle()))
        .await
        .unwrap();
    h.advance(ms(100)).await;
    assert_eq!(h.engine.screen_audio_sets(), 1);

    // The reconnect succeeds and asks for the token again; nobody answers.
    h.engine.drop_connection("network down");
    h.advance(ms(5500)).await;
    assert_eq!(h.controller.phase(), Phase::Streaming);
    assert_eq!(prompt.capture_requests(), 2);

    let stopped = tokio::time::timeout(Duration::from_secs(1), h.controller.stop()).await;
    assert!(stopped.is_ok(), "stop must not wait on the permission prompt");
    assert_eq!(h.controller.phase(), Phase::Idle);
    assert_eq!(h.engine.screen_audio_sets(), 1);
    assert!(h.sink.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_capture_prompt_gives_up_after_window() {
    let h = TestHarness::builder().build();
    let prompt = MockPrompt::granting();
    prompt.stop_answering_after(1);
    h.controller.start().await.unwrap();
    h.controller
        .switch_video_source(VideoSourceKind::Relay, Some(prompt.handle()))
        .await
        .unwrap();
    h.advance(ms(100)).await;

    h.engine.drop_connection("network down");
    h.advance(Duration::from_secs(20)).await;

    assert_eq!(h.controller.phase(), Phase::Streaming);
    assert_eq!(h.engine.audio_source(), Some(AudioSourceKind::Microphone));
    assert_eq!(h.engine.screen_audio_sets(), 1);

    // The session stays usable: a switch goes through without waiting.
    let switched = tokio::time::timeout(
        Duration::from_secs(1),
        h.controller
            .switch_video_source(VideoSourceKind::Placeholder, None),
    )
    .await;
    assert!(matches!(switched, Ok(Ok(_))));
}
