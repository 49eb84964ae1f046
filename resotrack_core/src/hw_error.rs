//! Maps `Box<dyn Error>` from the `Link` boundary to typed `SensorError`.
//!
//! The traits in `resotrack_traits` use `Box<dyn Error + Send + Sync>` so any
//! backend can plug in; this module turns those into the transport taxonomy,
//! with an optional feature-gated path for `resotrack_hardware::HwError`.

use crate::error::SensorError;

/// Map a link error to `Timeout` or `Connection`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_link_error(e: &(dyn std::error::Error + 'static)) -> SensorError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<resotrack_hardware::HwError>() {
            return match hw {
                resotrack_hardware::HwError::Timeout => SensorError::Timeout,
                other => SensorError::Connection(other.to_string()),
            };
        }
    }

    if let Some(io) = e.downcast_ref::<std::io::Error>()
        && io.kind() == std::io::ErrorKind::TimedOut
    {
        return SensorError::Timeout;
    }

    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        SensorError::Timeout
    } else {
        SensorError::Connection(s)
    }
}
