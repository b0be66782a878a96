//! Upstream media source management.
//!
//! - [`switch`] - the source-switch protocol
//! - [`relay_attach`] - attaching a relay feed and upgrading its audio
//! - [`tasks`] - single-slot supervision of background source work

pub mod relay_attach;
pub mod switch;
pub mod tasks;

use crate::collaborators::{AudioSource, CaptureToken, VideoSourceKind};

pub use tasks::{SourceTasks, TaskSlot};

/// Result of a successful `switch_video_source` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The new source is attached.
    Switched,
    /// Attachment continues in the background after a permission handshake.
    Pending,
    /// The requested source was already active.
    Unchanged,
}

/// Audio source that goes with a video source.
///
/// Camera-like sources carry their own microphone. Relay and placeholder
/// video get screen audio when a token valid for the current connection is
/// at hand, and the microphone otherwise.
#[must_use]
pub fn preferred_audio(video: VideoSourceKind, token: Option<CaptureToken>) -> AudioSource {
    match (video, token) {
        (VideoSourceKind::Relay | VideoSourceKind::Placeholder, Some(token)) => {
            AudioSource::ScreenAudioCapture(token)
        }
        _ => AudioSource::Microphone,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::AudioSourceKind;

    #[test]
    fn test_camera_sources_use_microphone() {
        let token = Some(CaptureToken::new("t"));
        assert_eq!(
            preferred_audio(VideoSourceKind::Capture, token.clone()).kind(),
            AudioSourceKind::Microphone
        );
        assert_eq!(
            preferred_audio(VideoSourceKind::ExternalDevice, token).kind(),
            AudioSourceKind::Microphone
        );
    }

    #[test]
    fn test_relay_uses_screen_audio_only_with_token() {
        assert_eq!(
            preferred_audio(VideoSourceKind::Relay, Some(CaptureToken::new("t"))).kind(),
            AudioSourceKind::ScreenAudioCapture
        );
        assert_eq!(
            preferred_audio(VideoSourceKind::Placeholder, None).kind(),
            AudioSourceKind::Microphone
        );
    }
}
