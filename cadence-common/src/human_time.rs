//! Human-readable time formatting for now-playing displays

/// Format a playback position or duration as a clock string.
///
/// Values under an hour render as `M:SS`, longer values as `H:MM:SS`.
/// Fractional seconds are truncated, negative and non-finite values render
/// as `0:00`.
///
/// # Examples
///
/// ```
/// use cadence_common::human_time::format_clock;
///
/// assert_eq!(format_clock(0.0), "0:00");
/// assert_eq!(format_clock(65.9), "1:05");
/// assert_eq!(format_clock(3661.0), "1:01:01");
/// ```
pub fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };

    let hours = total / 3600;
    let mins = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    }
}

/// Format a position against a duration, e.g. `1:05 / 3:20`.
///
/// An unknown duration renders as `--:--`.
pub fn format_progress(position: f64, duration: Option<f64>) -> String {
    match duration {
        Some(d) if d > 0.0 => format!("{} / {}", format_clock(position), format_clock(d)),
        _ => format!("{} / --:--", format_clock(position)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_values() {
        assert_eq!(format_clock(5.0), "0:05");
        assert_eq!(format_clock(59.99), "0:59");
        assert_eq!(format_clock(600.0), "10:00");
    }

    #[test]
    fn test_hour_boundary() {
        assert_eq!(format_clock(3599.0), "59:59");
        assert_eq!(format_clock(3600.0), "1:00:00");
    }

    #[test]
    fn test_invalid_values() {
        assert_eq!(format_clock(-3.0), "0:00");
        assert_eq!(format_clock(f64::NAN), "0:00");
        assert_eq!(format_clock(f64::INFINITY), "0:00");
    }

    #[test]
    fn test_progress() {
        assert_eq!(format_progress(65.0, Some(200.0)), "1:05 / 3:20");
        assert_eq!(format_progress(3.0, None), "0:03 / --:--");
        assert_eq!(format_progress(3.0, Some(0.0)), "0:03 / --:--");
    }
}
