//! Run-over-run reconciliation of scraped batches against the state store

use crate::collect::posting::Posting;
use crate::state::clock::parse_ts;
use crate::state::identity::{build_job_uid, canonicalize_url, PostingIdentity};
use crate::state::store::{StateMap, StateRecord, Status};
use chrono::{DateTime, Utc};
use std::collections::btree_map::Entry;
use std::collections::HashSet;

/// Closure thresholds. Both arms trigger independently (OR semantics); a
/// value of zero disables that arm.
#[derive(Debug, Clone)]
pub struct ClosePolicy {
    pub close_missing_runs: u32,
    pub close_not_seen_days: i64,
}

impl Default for ClosePolicy {
    fn default() -> Self {
        Self {
            close_missing_runs: 3,
            close_not_seen_days: 7,
        }
    }
}

#[derive(Debug)]
pub struct ReconcileOutcome {
    pub seen_this_run: HashSet<String>,
    pub newly_added: usize,
    pub newly_closed: usize,
}

/// Merge a fresh scraped batch into the state store.
///
/// Present postings create or refresh records and reset `missing_runs`;
/// absent open records accrue a missing run and close past the policy
/// thresholds. `applied` and `ignored` are never touched.
pub fn reconcile(
    batch: &[Posting],
    state: &mut StateMap,
    stamp: &str,
    now: DateTime<Utc>,
    policy: &ClosePolicy,
) -> ReconcileOutcome {
    let mut seen_this_run = HashSet::new();
    let mut newly_added = 0;

    for posting in batch {
        let identity = PostingIdentity::from(posting);
        let (job_uid, canonical_url) = build_job_uid(&identity);
        seen_this_run.insert(job_uid.clone());

        let link = posting.link.trim();

        match state.entry(job_uid.clone()) {
            Entry::Vacant(slot) => {
                let mut record = StateRecord::new(&job_uid, stamp);
                record.source = posting.source.clone();
                record.canonical_url = pick_canonical(&canonical_url, "", link);
                record.link = link.to_string();
                record.title = posting.title.clone();
                record.company = posting.company.clone();
                record.location = posting.location.clone();
                record.score = Some(posting.score as f64);
                record.match_label = posting.match_label.to_string();
                record.date = posting.date.clone();
                record.commute_min = posting.commute_min;
                slot.insert(record);
                newly_added += 1;
            }
            Entry::Occupied(mut slot) => {
                refresh_record(slot.get_mut(), posting, &canonical_url, link, stamp);
            }
        }
    }

    let mut newly_closed = 0;
    for (uid, record) in state.iter_mut() {
        if seen_this_run.contains(uid) || record.status.is_terminal() {
            continue;
        }
        record.missing_runs += 1;
        let days_missing = parse_ts(&record.last_seen_at)
            .map(|last_seen| (now - last_seen).num_days())
            .unwrap_or(0);

        let close_by_runs =
            policy.close_missing_runs > 0 && record.missing_runs >= policy.close_missing_runs;
        let close_by_days =
            policy.close_not_seen_days > 0 && days_missing >= policy.close_not_seen_days;
        if close_by_runs || close_by_days {
            record.status = Status::Closed;
            newly_closed += 1;
        }
    }

    ReconcileOutcome {
        seen_this_run,
        newly_added,
        newly_closed,
    }
}

/// Refresh a known record: scraped fields overwrite only when non-empty,
/// `first_seen_at` stays put, a closed record reopens unless user-terminal.
fn refresh_record(
    record: &mut StateRecord,
    posting: &Posting,
    canonical_url: &str,
    link: &str,
    stamp: &str,
) {
    if !posting.source.is_empty() {
        record.source = posting.source.clone();
    }
    record.canonical_url = pick_canonical(canonical_url, &record.canonical_url, link);
    if !link.is_empty() {
        record.link = link.to_string();
    }
    if !posting.title.is_empty() {
        record.title = posting.title.clone();
    }
    if !posting.company.is_empty() {
        record.company = posting.company.clone();
    }
    if !posting.location.is_empty() {
        record.location = posting.location.clone();
    }
    record.score = Some(posting.score as f64);
    record.match_label = posting.match_label.to_string();
    if !posting.date.is_empty() {
        record.date = posting.date.clone();
    }
    if posting.commute_min.is_some() {
        record.commute_min = posting.commute_min;
    }
    record.last_seen_at = stamp.to_string();
    record.missing_runs = 0;

    if record.status == Status::Closed {
        record.status = if record.last_sent_at.is_some() {
            Status::Notified
        } else {
            Status::New
        };
    }
}

fn pick_canonical(canonical_url: &str, existing: &str, link: &str) -> String {
    if !canonical_url.is_empty() {
        return canonical_url.to_string();
    }
    if !existing.is_empty() {
        return existing.to_string();
    }
    let derived = canonicalize_url(link);
    if !derived.is_empty() {
        return derived;
    }
    link.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const STAMP: &str = "2025-06-01T08:00:00Z";

    fn now() -> DateTime<Utc> {
        parse_ts(STAMP).unwrap()
    }

    fn posting(title: &str, link: &str) -> Posting {
        let mut posting = Posting::new(title, "Acme AG", "Zuerich", link, "jobs.ch");
        posting.score = 10;
        posting
    }

    fn policy(runs: u32, days: i64) -> ClosePolicy {
        ClosePolicy {
            close_missing_runs: runs,
            close_not_seen_days: days,
        }
    }

    #[test]
    fn test_first_sight_creates_new_record() {
        let batch = vec![posting("IT Supporter", "https://example.com/job/1")];
        let mut state = StateMap::new();

        let outcome = reconcile(&batch, &mut state, STAMP, now(), &ClosePolicy::default());

        assert_eq!(outcome.newly_added, 1);
        assert_eq!(outcome.newly_closed, 0);
        assert_eq!(state.len(), 1);

        let record = state.values().next().unwrap();
        assert_eq!(record.status, Status::New);
        assert_eq!(record.first_seen_at, STAMP);
        assert_eq!(record.last_seen_at, STAMP);
        assert_eq!(record.missing_runs, 0);
        assert_eq!(record.canonical_url, "https://example.com/job/1");
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let batch = vec![posting("IT Supporter", "https://example.com/job/1")];
        let mut state = StateMap::new();

        reconcile(&batch, &mut state, STAMP, now(), &ClosePolicy::default());
        let snapshot = state.clone();

        let outcome = reconcile(&batch, &mut state, STAMP, now(), &ClosePolicy::default());
        assert_eq!(outcome.newly_added, 0);
        assert_eq!(state, snapshot);
    }

    #[test]
    fn test_refresh_preserves_first_seen_and_prior_fields() {
        let mut state = StateMap::new();
        reconcile(
            &[posting("IT Supporter", "https://example.com/job/1")],
            &mut state,
            STAMP,
            now(),
            &ClosePolicy::default(),
        );

        let later = "2025-06-02T08:00:00Z";
        let mut sparse = posting("", "https://example.com/job/1");
        sparse.company = String::new();
        sparse.location = String::new();
        reconcile(
            &[sparse],
            &mut state,
            later,
            parse_ts(later).unwrap(),
            &ClosePolicy::default(),
        );

        let record = state.values().next().unwrap();
        assert_eq!(record.first_seen_at, STAMP);
        assert_eq!(record.last_seen_at, later);
        assert_eq!(record.title, "IT Supporter");
        assert_eq!(record.company, "Acme AG");
    }

    #[test]
    fn test_missing_runs_closure_threshold() {
        let batch = vec![posting("IT Supporter", "https://example.com/job/1")];
        let mut state = StateMap::new();
        reconcile(&batch, &mut state, STAMP, now(), &policy(3, 0));

        // Two absent passes: not yet closed.
        for _ in 0..2 {
            let outcome = reconcile(&[], &mut state, STAMP, now(), &policy(3, 0));
            assert_eq!(outcome.newly_closed, 0);
        }
        let record = state.values().next().unwrap();
        assert_eq!(record.missing_runs, 2);
        assert_eq!(record.status, Status::New);

        // Third absent pass crosses the threshold.
        let outcome = reconcile(&[], &mut state, STAMP, now(), &policy(3, 0));
        assert_eq!(outcome.newly_closed, 1);
        assert_eq!(state.values().next().unwrap().status, Status::Closed);
    }

    #[test]
    fn test_not_seen_days_closure() {
        let batch = vec![posting("IT Supporter", "https://example.com/job/1")];
        let mut state = StateMap::new();
        reconcile(&batch, &mut state, STAMP, now(), &policy(0, 7));

        let much_later = now() + Duration::days(8);
        let outcome = reconcile(&[], &mut state, STAMP, much_later, &policy(0, 7));
        assert_eq!(outcome.newly_closed, 1);
    }

    #[test]
    fn test_transient_absence_resets_counter() {
        let batch = vec![posting("IT Supporter", "https://example.com/job/1")];
        let mut state = StateMap::new();
        reconcile(&batch, &mut state, STAMP, now(), &policy(3, 0));

        reconcile(&[], &mut state, STAMP, now(), &policy(3, 0));
        assert_eq!(state.values().next().unwrap().missing_runs, 1);

        reconcile(&batch, &mut state, STAMP, now(), &policy(3, 0));
        let record = state.values().next().unwrap();
        assert_eq!(record.missing_runs, 0);
        assert_eq!(record.status, Status::New);
    }

    #[test]
    fn test_user_terminal_states_are_sticky() {
        let batch = vec![posting("IT Supporter", "https://example.com/job/1")];
        let mut state = StateMap::new();
        reconcile(&batch, &mut state, STAMP, now(), &ClosePolicy::default());

        let uid = state.keys().next().unwrap().clone();
        state.get_mut(&uid).unwrap().status = Status::Applied;

        // Present again: still applied.
        reconcile(&batch, &mut state, STAMP, now(), &ClosePolicy::default());
        assert_eq!(state[&uid].status, Status::Applied);

        // Absent many times: still applied, no missing-run accrual.
        for _ in 0..5 {
            reconcile(&[], &mut state, STAMP, now(), &policy(1, 0));
        }
        assert_eq!(state[&uid].status, Status::Applied);
        assert_eq!(state[&uid].missing_runs, 0);
    }

    #[test]
    fn test_closed_record_reopens_on_reappearance() {
        let batch = vec![posting("IT Supporter", "https://example.com/job/1")];
        let mut state = StateMap::new();
        reconcile(&batch, &mut state, STAMP, now(), &policy(1, 0));
        reconcile(&[], &mut state, STAMP, now(), &policy(1, 0));

        let uid = state.keys().next().unwrap().clone();
        assert_eq!(state[&uid].status, Status::Closed);

        // Never sent: reopens as new.
        reconcile(&batch, &mut state, STAMP, now(), &policy(1, 0));
        assert_eq!(state[&uid].status, Status::New);

        // Previously sent: reopens as notified.
        state.get_mut(&uid).unwrap().last_sent_at = Some(STAMP.to_string());
        reconcile(&[], &mut state, STAMP, now(), &policy(1, 0));
        assert_eq!(state[&uid].status, Status::Closed);
        reconcile(&batch, &mut state, STAMP, now(), &policy(1, 0));
        assert_eq!(state[&uid].status, Status::Notified);
    }

    #[test]
    fn test_closed_records_do_not_accrue_missing_runs() {
        let batch = vec![posting("IT Supporter", "https://example.com/job/1")];
        let mut state = StateMap::new();
        reconcile(&batch, &mut state, STAMP, now(), &policy(1, 0));
        reconcile(&[], &mut state, STAMP, now(), &policy(1, 0));

        let uid = state.keys().next().unwrap().clone();
        let runs_at_close = state[&uid].missing_runs;

        let outcome = reconcile(&[], &mut state, STAMP, now(), &policy(1, 0));
        assert_eq!(outcome.newly_closed, 0);
        assert_eq!(state[&uid].missing_runs, runs_at_close);
    }

    #[test]
    fn test_cross_portal_postings_stay_distinct() {
        let mut a = posting("IT Supporter", "");
        a.source = "jobs.ch".to_string();
        let mut b = posting("IT Supporter", "");
        b.source = "jobup".to_string();

        let mut state = StateMap::new();
        let outcome = reconcile(&[a, b], &mut state, STAMP, now(), &ClosePolicy::default());
        assert_eq!(outcome.newly_added, 2);
        assert_eq!(state.len(), 2);
    }
}
