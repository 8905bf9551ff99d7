//! Timestamp helpers and reminder scheduling

use chrono::{DateTime, SecondsFormat, Utc};

/// Current UTC time as ISO-8601 with "Z" suffix, second precision.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an ISO-8601 timestamp; None on any malformed input.
pub fn parse_ts(value: &str) -> Option<DateTime<Utc>> {
    if value.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Decide whether a reminder is due for a record last sent at `last_sent_at`.
///
/// Malformed or absent timestamps fail open: the reminder counts as due.
pub fn should_send_reminder(
    last_sent_at: Option<&str>,
    now: DateTime<Utc>,
    reminder_days: i64,
    daily_reminders: bool,
) -> bool {
    if daily_reminders {
        return true;
    }
    let last_sent_at = match last_sent_at {
        Some(v) if !v.is_empty() => v,
        _ => return true,
    };
    if reminder_days <= 0 {
        return true;
    }
    let last = match parse_ts(last_sent_at) {
        Some(dt) => dt,
        None => return true,
    };
    (now - last).num_days() >= reminder_days
}
