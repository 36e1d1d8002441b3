//! Human-readable timeline positions for log output

/// Positions below one hour print as `M:SS.mmm`
const HOUR_MS: u64 = 3_600_000;

/// Format a millisecond timeline position.
///
/// - Below one hour: `M:SS.mmm`
/// - One hour and above: `H:MM:SS.mmm`
///
/// # Examples
///
/// ```
/// use syncplay_common::human_time::format_position;
///
/// assert_eq!(format_position(0), "0:00.000");
/// assert_eq!(format_position(65_250), "1:05.250");
/// assert_eq!(format_position(3_723_004), "1:02:03.004");
/// ```
pub fn format_position(ms: u64) -> String {
    let millis = ms % 1000;
    let total_secs = ms / 1000;
    let secs = total_secs % 60;

    if ms < HOUR_MS {
        let minutes = total_secs / 60;
        format!("{}:{:02}.{:03}", minutes, secs, millis)
    } else {
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        format!("{}:{:02}:{:02}.{:03}", hours, minutes, secs, millis)
    }
}

/// Format a `[start, end)` window on a timeline
pub fn format_window(start_ms: u64, end_ms: u64) -> String {
    format!("[{}, {})", format_position(start_ms), format_position(end_ms))
}
