//! Duration formatting for chronometer display

/// Format a second count as `HH:MM:SS`. Hours grow past two digits rather
/// than wrap; negative inputs clamp to zero.
pub fn format_hms(secs: i64) -> String {
    let secs = secs.max(0);
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Compact form for tables: `2h05` / `12m` / `45s`.
pub fn format_compact(secs: i64) -> String {
    let secs = secs.max(0);
    if secs >= 3600 {
        format!("{}h{:02}", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(0), "00:00:00");
        assert_eq!(format_hms(59), "00:00:59");
        assert_eq!(format_hms(61), "00:01:01");
        assert_eq!(format_hms(3661), "01:01:01");
        assert_eq!(format_hms(100 * 3600), "100:00:00");
        assert_eq!(format_hms(-5), "00:00:00");
    }

    #[test]
    fn test_format_compact() {
        assert_eq!(format_compact(45), "45s");
        assert_eq!(format_compact(720), "12m");
        assert_eq!(format_compact(7500), "2h05");
    }
}
