//! Compact duration formatting for the stats row.

use std::time::Duration;

/// Format a duration for a narrow display slot, e.g. `2h15m`, `3m05s`, `45s`.
///
/// Precision shrinks as magnitude grows: days of headroom do not need
/// second-level detail on an eight-row screen.
#[must_use]
#[allow(clippy::arithmetic_side_effects)] // divisors and moduli are nonzero constants
pub fn pretty_short_delay(d: Duration) -> String {
    let total = d.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    if days > 0 {
        format!("{days}d{hours}h")
    } else if hours > 0 {
        format!("{hours}h{minutes:02}m")
    } else if minutes > 0 {
        format!("{minutes}m{seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_only() {
        assert_eq!(pretty_short_delay(Duration::from_secs(45)), "45s");
        assert_eq!(pretty_short_delay(Duration::from_secs(0)), "0s");
    }

    #[test]
    fn test_minutes_pad_seconds() {
        assert_eq!(pretty_short_delay(Duration::from_secs(185)), "3m05s");
    }

    #[test]
    fn test_hours_pad_minutes() {
        assert_eq!(pretty_short_delay(Duration::from_secs(2 * 3_600 + 15 * 60)), "2h15m");
    }

    #[test]
    fn test_days_drop_minutes() {
        assert_eq!(pretty_short_delay(Duration::from_secs(86_400 + 3 * 3_600)), "1d3h");
    }
}
