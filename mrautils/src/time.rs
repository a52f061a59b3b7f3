//! Time formatting and parsing helpers.
//!
//! Conversions between HH:MM:SS strings (used by SOAP-style renderers),
//! seconds, and milliseconds.

/// Formats a duration in seconds as HH:MM:SS.
///
/// # Examples
/// ```
/// # use mrautils::format_hhmmss;
/// assert_eq!(format_hhmmss(0), "00:00:00");
/// assert_eq!(format_hhmmss(61), "00:01:01");
/// assert_eq!(format_hhmmss(3661), "01:01:01");
/// ```
pub fn format_hhmmss(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

/// Parses a time string in HH:MM:SS, MM:SS, or SS format to seconds.
///
/// # Examples
/// ```
/// # use mrautils::parse_time_flexible;
/// assert_eq!(parse_time_flexible("01:02:03"), Some(3723));
/// assert_eq!(parse_time_flexible("02:03"), Some(123));
/// assert_eq!(parse_time_flexible("42"), Some(42));
/// ```
pub fn parse_time_flexible(input: &str) -> Option<u32> {
    let parts: Vec<&str> = input.split(':').collect();

    if parts.is_empty() || parts.len() > 3 {
        return None;
    }

    let mut total = 0u32;
    for part in parts {
        let value = part.parse::<u32>().ok()?;
        total = total.checked_mul(60)?.checked_add(value)?;
    }

    Some(total)
}

/// Converts milliseconds to seconds (rounding down).
#[inline]
pub fn ms_to_seconds(milliseconds: u64) -> u64 {
    milliseconds / 1000
}

/// Converts seconds to milliseconds.
#[inline]
pub fn seconds_to_ms(seconds: u64) -> u64 {
    seconds * 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_hhmmss() {
        assert_eq!(format_hhmmss(0), "00:00:00");
        assert_eq!(format_hhmmss(1), "00:00:01");
        assert_eq!(format_hhmmss(61), "00:01:01");
        assert_eq!(format_hhmmss(3600), "01:00:00");
        assert_eq!(format_hhmmss(86399), "23:59:59");
    }

    #[test]
    fn test_parse_time_flexible() {
        assert_eq!(parse_time_flexible("01:02:03"), Some(3723));
        assert_eq!(parse_time_flexible("02:03"), Some(123));
        assert_eq!(parse_time_flexible("42"), Some(42));

        assert_eq!(parse_time_flexible(""), None);
        assert_eq!(parse_time_flexible("1:2:3:4"), None);
        assert_eq!(parse_time_flexible("abc"), None);
    }

    #[test]
    fn test_ms_conversions() {
        assert_eq!(ms_to_seconds(1500), 1);
        assert_eq!(seconds_to_ms(2), 2000);
    }
}
