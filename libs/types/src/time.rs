//! Wall-clock timestamps for package stamping

use chrono::Utc;

/// Milliseconds since the unix epoch, clamped at zero for pre-epoch clocks
pub fn current_timestamp_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
