//! Time representation for media positions.
//! Media elements report positions as floating point seconds, so that is the
//! unit used throughout the crate. Wall-clock bookkeeping uses `Duration`.

use std::time::Duration;

/// Media position in seconds since the start of the stream
pub type Seconds = f64;

/// Time constants for conversions
pub mod constants {
    pub const MILLIS_PER_SECOND: f64 = 1_000.0;
    pub const MICROS_PER_SECOND: f64 = 1_000_000.0;
}

/// Position zero
pub const ZERO: Seconds = 0.0;

/// Convert milliseconds to seconds
#[inline]
pub fn from_millis(millis: i64) -> Seconds {
    millis as f64 / constants::MILLIS_PER_SECOND
}

/// Convert seconds to whole milliseconds (truncating)
#[inline]
pub fn to_millis(seconds: Seconds) -> i64 {
    (seconds * constants::MILLIS_PER_SECOND) as i64
}

/// Convert microseconds to seconds
#[inline]
pub fn from_micros(micros: i64) -> Seconds {
    micros as f64 / constants::MICROS_PER_SECOND
}

/// Convert a wall-clock duration to seconds
#[inline]
pub fn from_duration(duration: Duration) -> Seconds {
    duration.as_secs_f64()
}

/// Clamp a requested position into `[0, duration]`.
///
/// An unknown (`None`) or non-finite duration only clamps the lower bound,
/// as happens for live or not-yet-loaded sources.
pub fn clamp_position(position: Seconds, duration: Option<Seconds>) -> Seconds {
    let position = if position.is_finite() { position.max(ZERO) } else { ZERO };
    match duration {
        Some(d) if d.is_finite() && d >= ZERO => position.min(d),
        _ => position,
    }
}

/// Format a position as HH:MM:SS, or MM:SS under an hour
pub fn format_time(seconds: Seconds) -> String {
    let negative = seconds < 0.0;
    let total = seconds.abs().floor() as i64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    let sign = if negative { "-" } else { "" };

    if hours > 0 {
        format!("{}{}:{:02}:{:02}", sign, hours, minutes, secs)
    } else {
        format!("{}{:02}:{:02}", sign, minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_conversion() {
        assert_eq!(from_millis(1500), 1.5);
        assert_eq!(to_millis(1.5), 1500);
        assert_eq!(from_millis(-250), -0.25);
    }

    #[test]
    fn test_micros_conversion() {
        assert_eq!(from_micros(1_500_000), 1.5);
        assert!((from_micros(1_234_567) - 1.234567).abs() < 1e-9);
    }

    #[test]
    fn test_from_duration() {
        assert_eq!(from_duration(Duration::from_millis(2500)), 2.5);
    }

    #[test]
    fn test_clamp_position() {
        assert_eq!(clamp_position(-3.0, Some(10.0)), 0.0);
        assert_eq!(clamp_position(12.0, Some(10.0)), 10.0);
        assert_eq!(clamp_position(4.0, Some(10.0)), 4.0);
        // Unknown duration only clamps the lower bound
        assert_eq!(clamp_position(400.0, None), 400.0);
        assert_eq!(clamp_position(400.0, Some(f64::NAN)), 400.0);
        assert_eq!(clamp_position(f64::NAN, Some(10.0)), 0.0);
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(3661.5), "1:01:01");
        assert_eq!(format_time(59.9), "00:59");
        assert_eq!(format_time(-5.0), "-00:05");
        assert_eq!(format_time(ZERO), "00:00");
    }
}
