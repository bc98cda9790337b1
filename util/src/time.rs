//! General time utility functions

use chrono;
use std::time::Duration;

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Convert a duration into a number of seconds, or `None` if overflow
pub fn duration_to_seconds(duration: chrono::Duration) -> Option<f64> {
    duration
        .num_nanoseconds()
        .map(|ns| ns as f64 / NANOS_PER_SECOND as f64)
}

/// Get the period of a loop running at the given frequency.
///
/// Non-positive or non-finite frequencies return `None`.
pub fn period_from_hz(frequency_hz: f64) -> Option<Duration> {
    if frequency_hz.is_finite() && frequency_hz > 0.0 {
        Some(Duration::from_secs_f64(1.0 / frequency_hz))
    } else {
        None
    }
}

/// Sleep for the remainder of a cycle which started at `cycle_start`.
///
/// Returns the amount by which the cycle overran its period, if it did.
pub fn sleep_remaining(cycle_start: std::time::Instant, period: Duration) -> Option<Duration> {
    let elapsed = cycle_start.elapsed();

    match period.checked_sub(elapsed) {
        Some(d) => {
            std::thread::sleep(d);
            None
        }
        None => Some(elapsed - period),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_period_from_hz() {
        assert_eq!(period_from_hz(4.0), Some(Duration::from_millis(250)));
        assert_eq!(period_from_hz(0.0), None);
        assert_eq!(period_from_hz(-5.0), None);
        assert_eq!(period_from_hz(f64::NAN), None);
    }

    #[test]
    fn test_duration_to_seconds() {
        assert_eq!(
            duration_to_seconds(chrono::Duration::milliseconds(1500)),
            Some(1.5)
        );
    }

    #[test]
    fn test_sleep_remaining_overrun() {
        let start = std::time::Instant::now();
        std::thread::sleep(Duration::from_millis(5));
        assert!(sleep_remaining(start, Duration::from_millis(1)).is_some());
        assert!(sleep_remaining(std::time::Instant::now(), Duration::from_millis(2)).is_none());
    }
}
