use chrono::{DateTime, Utc};

/// Render an epoch-millis timestamp relative to `now`, the way the
/// notification list shows it: "5m ago", "3h ago", "2d ago", and a
/// plain date once it is a week old.
pub fn relative_time(timestamp_millis: i64, now: DateTime<Utc>) -> String {
    let diff_ms = now.timestamp_millis().saturating_sub(timestamp_millis);
    let minutes = diff_ms / (1000 * 60);
    let hours = minutes / 60;
    let days = hours / 24;

    if minutes < 60 {
        return format!("{}m ago", minutes.max(0));
    }
    if hours < 24 {
        return format!("{hours}h ago");
    }
    if days < 7 {
        return format!("{days}d ago");
    }

    match DateTime::<Utc>::from_timestamp_millis(timestamp_millis) {
        Some(dt) => dt.format("%Y-%m-%d").to_string(),
        None => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_relative_buckets() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();

        let five_min = (now - Duration::minutes(5)).timestamp_millis();
        assert_eq!(relative_time(five_min, now), "5m ago");

        let three_hours = (now - Duration::hours(3)).timestamp_millis();
        assert_eq!(relative_time(three_hours, now), "3h ago");

        let two_days = (now - Duration::days(2)).timestamp_millis();
        assert_eq!(relative_time(two_days, now), "2d ago");

        let two_weeks = (now - Duration::days(14)).timestamp_millis();
        assert_eq!(relative_time(two_weeks, now), "2024-06-01");
    }

    #[test]
    fn test_future_timestamp_clamps_to_now() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        let future = (now + Duration::minutes(10)).timestamp_millis();
        assert_eq!(relative_time(future, now), "0m ago");
    }
}
