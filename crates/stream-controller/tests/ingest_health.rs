//! Integration tests for the relay ingest health monitor.
//!
//! Drives playback states through the mock relay player on a paused clock:
//! - sustained buffering and playback end trigger exactly one fallback
//! - short rebuffers are tolerated
//! - the reattach loop restores the feed and is cancelled by a new switch
//! - the fallback never touches the outbound session

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use sc_test_utils::{init_test_tracing, EngineCall, TestHarness};
use stream_controller::collaborators::{
    AudioSourceKind, MediaEngine, PlaybackHandle, PlaybackState, VideoSource, VideoSourceKind,
};
use stream_controller::health::DisconnectReason;
use stream_controller::session::Phase;

const FALLBACK_MESSAGE: &str = "Relay feed lost, retrying";

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

async fn attach_relay(h: &TestHarness) -> PlaybackHandle {
    h.controller
        .switch_video_source(VideoSourceKind::Relay, None)
        .await
        .unwrap();
    let handle = h.relay.latest().unwrap();
    h.relay.set_state(handle, PlaybackState::Playing);
    h.advance(ms(10)).await;
    handle
}

fn fallback_count(h: &TestHarness) -> usize {
    h.sink
        .messages()
        .iter()
        .filter(|m| m.as_str() == FALLBACK_MESSAGE)
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_sustained_buffering_falls_back_once() {
    init_test_tracing();
    let h = TestHarness::builder().build();
    let handle = attach_relay(&h).await;

    h.relay.set_state(handle, PlaybackState::Buffering);
    h.advance(Duration::from_secs(3)).await;

    assert_eq!(
        h.engine.video_source().map(|v| v.kind()),
        Some(VideoSourceKind::Placeholder)
    );
    assert_eq!(h.engine.audio_source(), Some(AudioSourceKind::Microphone));
    assert!(h.relay.released().contains(&handle));
    assert_eq!(fallback_count(&h), 1);

    // A second signal while the fallback is in flight is ignored.
    assert!(
        !h.controller
            .handle_ingest_disconnect(DisconnectReason::Buffering)
            .await
    );
    assert_eq!(fallback_count(&h), 1);
    assert_eq!(
        h.engine.count(EngineCall::SetVideo(VideoSourceKind::Placeholder)),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_short_rebuffer_is_tolerated() {
    let h = TestHarness::builder().build();
    let handle = attach_relay(&h).await;

    h.relay.set_state(handle, PlaybackState::Buffering);
    h.advance(ms(1500)).await;
    h.relay.set_state(handle, PlaybackState::Playing);
    h.advance(Duration::from_secs(5)).await;

    assert_eq!(h.engine.video_source(), Some(VideoSource::Relay(handle)));
    assert_eq!(fallback_count(&h), 0);
    assert_eq!(h.relay.prepared().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_playback_end_triggers_immediate_fallback() {
    let h = TestHarness::builder().build();
    let handle = attach_relay(&h).await;

    h.relay.set_state(handle, PlaybackState::Ended);
    h.advance(ms(50)).await;

    assert_eq!(
        h.engine.video_source().map(|v| v.kind()),
        Some(VideoSourceKind::Placeholder)
    );
    assert_eq!(fallback_count(&h), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reattach_restores_relay_feed() {
    let h = TestHarness::builder().build();
    let handle = attach_relay(&h).await;

    h.relay.set_state(handle, PlaybackState::Ended);
    h.advance(ms(50)).await;
    assert_eq!(h.relay.prepared().len(), 1);

    h.advance(Duration::from_secs(3)).await;

    assert_eq!(h.relay.prepared().len(), 2);
    let restored = h.relay.latest().unwrap();
    assert_ne!(restored, handle);
    assert_eq!(h.engine.video_source(), Some(VideoSource::Relay(restored)));
    assert!(h
        .sink
        .messages()
        .contains(&"Relay feed restored".to_string()));

    // The in-flight guard is cleared, so a new disconnect is handled.
    h.relay.set_state(restored, PlaybackState::Ended);
    h.advance(ms(50)).await;
    assert_eq!(fallback_count(&h), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reattach_keeps_retrying_while_feed_is_down() {
    let h = TestHarness::builder().build();
    let handle = attach_relay(&h).await;
    h.relay.fail_next_prepares(2);

    h.relay.set_state(handle, PlaybackState::Ended);
    h.advance(Duration::from_secs(7)).await;
    assert_eq!(
        h.engine.video_source().map(|v| v.kind()),
        Some(VideoSourceKind::Placeholder)
    );

    h.advance(Duration::from_secs(3)).await;
    assert_eq!(
        h.engine.video_source().map(|v| v.kind()),
        Some(VideoSourceKind::Relay)
    );
    // Reattach failures are not user-facing errors.
    assert!(h.sink.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_ignored_when_not_on_relay() {
    let h = TestHarness::builder().build();
    h.controller.start().await.unwrap();

    assert!(
        !h.controller
            .handle_ingest_disconnect(DisconnectReason::Ended)
            .await
    );
    // The guard resets, so the next signal is evaluated again.
    assert!(
        !h.controller
            .handle_ingest_disconnect(DisconnectReason::Ended)
            .await
    );
    assert_eq!(fallback_count(&h), 0);
}

#[tokio::test(start_paused = true)]
async fn test_switch_to_camera_cancels_reattach() {
    let h = TestHarness::builder().build();
    let handle = attach_relay(&h).await;

    h.relay.set_state(handle, PlaybackState::Ended);
    h.advance(ms(50)).await;

    h.controller
        .switch_video_source(VideoSourceKind::Capture, None)
        .await
        .unwrap();
    h.advance(Duration::from_secs(10)).await;

    assert_eq!(h.relay.prepared().len(), 1);
    assert_eq!(
        h.engine.video_source().map(|v| v.kind()),
        Some(VideoSourceKind::Capture)
    );
}

#[tokio::test(start_paused = true)]
async fn test_fallback_leaves_outbound_session_alone() {
    let h = TestHarness::builder().build();
    h.controller.start().await.unwrap();
    let handle = attach_relay(&h).await;

    h.relay.set_state(handle, PlaybackState::Buffering);
    h.advance(Duration::from_secs(3)).await;

    assert_eq!(fallback_count(&h), 1);
    assert_eq!(h.controller.phase(), Phase::Streaming);
    assert_eq!(h.engine.count(EngineCall::Open), 1);
    assert_eq!(h.engine.count(EngineCall::StopStream), 0);
    assert!(h.sink.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reattach_owed_across_reconnect_resumes() {
    let h = TestHarness::builder().build();
    h.controller.start().await.unwrap();
    let handle = attach_relay(&h).await;

    h.relay.set_state(handle, PlaybackState::Ended);
    h.advance(ms(50)).await;

    // Outbound loss interrupts the reattach loop before it fires.
    h.engine.drop_connection("network down");
    h.advance(Duration::from_secs(4)).await;
    assert_eq!(h.relay.prepared().len(), 1);

    // Reconnect at 5s resumes the loop, which reattaches 3s later.
    h.advance(Duration::from_secs(5)).await;
    assert_eq!(h.controller.phase(), Phase::Streaming);
    assert_eq!(h.relay.prepared().len(), 2);
    assert_eq!(
        h.engine.video_source().map(|v| v.kind()),
        Some(VideoSourceKind::Relay)
    );
}

#[tokio::test(start_paused = true)]
async fn test_fallback_waits_for_slow_close() {
    let h = TestHarness::builder().build();
    h.controller.start().await.unwrap();
    let handle = attach_relay(&h).await;
    h.engine.set_close_delay(Duration::from_secs(3));

    h.controller.stop().await;
    assert!(h.controller.flags().cleanup_in_progress);

    h.relay.set_state(handle, PlaybackState::Ended);
    h.advance(ms(100)).await;

    // The engine is still closing; its sources are left alone.
    assert!(h.controller.flags().cleanup_in_progress);
    assert_eq!(h.engine.video_source(), Some(VideoSource::Relay(handle)));

    h.advance(Duration::from_secs(4)).await;

    assert!(!h.controller.flags().cleanup_in_progress);
    assert_eq!(
        h.engine.video_source().map(|v| v.kind()),
        Some(VideoSourceKind::Placeholder)
    );
    assert_eq!(fallback_count(&h), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reattach_deferred_during_slow_close() {
    let h = TestHarness::builder().build();
    h.controller.start().await.unwrap();
    let handle = attach_relay(&h).await;

    h.relay.set_state(handle, PlaybackState::Ended);
    h.advance(ms(50)).await;
    assert_eq!(fallback_count(&h), 1);

    // The reattach would fire 3s after the fallback, inside the slow close.
    h.engine.set_close_delay(Duration::from_secs(5));
    h.controller.stop().await;
    h.advance(Duration::from_secs(4)).await;
    assert!(h.controller.flags().cleanup_in_progress);
    assert_eq!(h.relay.prepared().len(), 1);
    assert_eq!(
        h.engine.video_source().map(|v| v.kind()),
        Some(VideoSourceKind::Placeholder)
    );

    // Once the close finishes the next attempt goes through.
    h.advance(Duration::from_secs(4)).await;
    assert!(!h.controller.flags().cleanup_in_progress);
    assert_eq!(h.relay.prepared().len(), 2);
    assert_eq!(
        h.engine.video_source().map(|v| v.kind()),
        Some(VideoSourceKind::Relay)
    );
}
