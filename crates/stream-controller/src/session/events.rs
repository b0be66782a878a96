//! Events published to the host.

use super::phase::SessionStatus;
use crate::errors::ScError;

/// Everything the controller tells its host.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The flat status changed.
    Status(SessionStatus),
    /// Low-priority human-readable message (e.g. "Reconnecting...").
    Message(String),
    /// A failure the host should show. Never sent while reconnecting.
    Error(ScError),
    /// Current outbound bitrate, formatted for display.
    Bitrate(String),
    Muted(bool),
}

/// Format a bitrate for display: `"2.5 Mbps"`, `"800 Kbps"`.
#[must_use]
pub fn format_bitrate(bits_per_second: u64) -> String {
    if bits_per_second >= 1_000_000 {
        // Display precision only.
        #[allow(clippy::cast_precision_loss)]
        let mbps = bits_per_second as f64 / 1_000_000.0;
        format!("{mbps:.1} Mbps")
    } else {
        format!("{} Kbps", bits_per_second / 1_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bitrate() {
        assert_eq!(format_bitrate(2_500_000), "2.5 Mbps");
        assert_eq!(format_bitrate(1_000_000), "1.0 Mbps");
        assert_eq!(format_bitrate(800_000), "800 Kbps");
        assert_eq!(format_bitrate(999), "0 Kbps");
    }
}
