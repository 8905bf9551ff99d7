//! Partition reconciled records into notification groups

use crate::state::clock::should_send_reminder;
use crate::state::store::{StateMap, Status};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// UID lists per notification group, each sorted by score descending.
/// `open_jobs` overlaps the other two; it backs the send-everything-open mode.
#[derive(Debug, Default)]
pub struct Classified {
    pub new_jobs: Vec<String>,
    pub reminder_jobs: Vec<String>,
    pub open_jobs: Vec<String>,
}

/// Classify the records seen this run. Terminal records never appear in any
/// group; a UID lands in at most one of new/reminder.
pub fn classify(
    state: &StateMap,
    seen_this_run: &HashSet<String>,
    now: DateTime<Utc>,
    reminder_days: i64,
    daily_reminders: bool,
) -> Classified {
    let mut new_jobs = Vec::new();
    let mut new_uids = HashSet::new();
    let mut reminder_jobs = Vec::new();
    let mut open_jobs = Vec::new();

    for uid in seen_this_run {
        let record = match state.get(uid) {
            Some(record) if !record.status.is_terminal() => record,
            _ => continue,
        };
        if record.status == Status::New {
            new_jobs.push(uid.clone());
            new_uids.insert(uid.clone());
        }
    }

    for uid in seen_this_run {
        let record = match state.get(uid) {
            Some(record) if !record.status.is_terminal() => record,
            _ => continue,
        };
        if record.status.is_open() {
            open_jobs.push(uid.clone());
            if should_send_reminder(
                record.last_sent_at.as_deref(),
                now,
                reminder_days,
                daily_reminders,
            ) && !new_uids.contains(uid)
            {
                reminder_jobs.push(uid.clone());
            }
        }
    }

    sort_by_score(&mut new_jobs, state);
    sort_by_score(&mut reminder_jobs, state);
    sort_by_score(&mut open_jobs, state);

    Classified {
        new_jobs,
        reminder_jobs,
        open_jobs,
    }
}

/// Score descending, UID as tie-breaker so output order is stable.
fn sort_by_score(uids: &mut [String], state: &StateMap) {
    uids.sort_by(|a, b| {
        let score_a = state.get(a).map(|r| r.score_value()).unwrap_or(0.0);
        let score_b = state.get(b).map(|r| r.score_value()).unwrap_or(0.0);
        score_b
            .partial_cmp(&score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.cmp(b))
    });
}

/// Post-send contract: the dispatched records become notified with the run's
/// stamp. Only called after the sender confirmed success, never on dry runs.
pub fn mark_notified(state: &mut StateMap, uids: &[String], stamp: &str) {
    for uid in uids {
        if let Some(record) = state.get_mut(uid) {
            record.status = Status::Notified;
            record.last_sent_at = Some(stamp.to_string());
        }
    }
}
