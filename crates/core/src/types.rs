/// Wall-clock timestamps are local time, matching the controller's logs.
pub type Timestamp = chrono::DateTime<chrono::Local>;

/// Format used for every timestamp written to disk or sent to services.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render a timestamp as `YYYY-MM-DD HH:MM:SS`.
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn formats_without_fraction_or_offset() {
        let ts = chrono::Local
            .with_ymd_and_hms(2024, 3, 7, 9, 5, 1)
            .single()
            .expect("unambiguous local time");
        assert_eq!(format_timestamp(&ts), "2024-03-07 09:05:01");
    }
}
