//! One full pipeline run: state in, scrape batch merged, digests out

use crate::collect::adapters::default_adapters;
use crate::collect::collector::{build_client, collect_jobs, export_json};
use crate::collect::posting::Posting;
use crate::config::Config;
use crate::error::{JobScoutError, Result};
use crate::notify::{build_digest, dispatch, Notifier, WhatsAppNotifier};
use crate::pipeline::classifier::{classify, mark_notified};
use crate::pipeline::reconciler::{reconcile, ClosePolicy};
use crate::pipeline::run_lock::RunLock;
use crate::state::clock::{now_iso, parse_ts};
use crate::state::store::{count_status, load_state, save_state, StateMap, Status};
use crate::tracker::{apply_tracker_marks, load_tracker, write_tracker};
use chrono::Utc;
use log::info;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    /// Send everything open instead of new + reminders.
    pub send_open: bool,
}

#[derive(Debug, Default)]
pub struct RunStats {
    pub scraped_total: usize,
    pub unique_total: usize,
    pub state_total: usize,
    pub newly_added: usize,
    pub active_seen_this_run: usize,
    pub mailed_new_count: usize,
    pub mailed_reminder_count: usize,
    pub marked_closed_count: usize,
    pub applied_count: usize,
    pub ignored_count: usize,
    pub migrated_from_seen: bool,
    pub dry_run: bool,
    pub mail_sent: bool,
}

impl RunStats {
    pub fn counter_lines(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("scraped_total", self.scraped_total),
            ("unique_total", self.unique_total),
            ("state_total", self.state_total),
            ("newly_added", self.newly_added),
            ("active_seen_this_run", self.active_seen_this_run),
            ("mailed_new_count", self.mailed_new_count),
            ("mailed_reminder_count", self.mailed_reminder_count),
            ("marked_closed_count", self.marked_closed_count),
            ("applied_count", self.applied_count),
            ("ignored_count", self.ignored_count),
        ]
    }
}

/// Keep postings at or above the score threshold; a batch where nothing
/// qualifies falls back to the first ten.
pub fn payload_from_postings(postings: Vec<Posting>, min_score: i64) -> Vec<Posting> {
    let qualified: Vec<Posting> = postings
        .iter()
        .filter(|p| p.score >= min_score)
        .cloned()
        .collect();
    if !qualified.is_empty() {
        return qualified;
    }
    postings.into_iter().take(10).collect()
}

/// Aggregator portals re-post other portals' listings; their records are
/// closed outright so only the primary source stays active.
pub fn close_aggregator_records(state: &mut StateMap, aggregator_sources: &[String]) -> usize {
    let sources: Vec<String> = aggregator_sources
        .iter()
        .map(|s| s.trim().to_lowercase())
        .collect();
    let mut closed = 0;
    for record in state.values_mut() {
        let source = record.source.trim().to_lowercase();
        if sources.contains(&source) && !record.status.is_terminal() {
            record.status = Status::Closed;
            closed += 1;
        }
    }
    closed
}

/// Scrape all portals and run the full reconciliation pipeline.
pub async fn run(config: &Config, options: &RunOptions) -> Result<RunStats> {
    let client = build_client()?;
    let adapters = default_adapters();
    let scraped = collect_jobs(config, &client, &adapters).await?;

    let notifiers: Vec<Box<dyn Notifier>> = vec![Box::new(WhatsAppNotifier::new(
        config.whatsapp.clone(),
        client,
    ))];

    run_with_batch(config, options, scraped, &notifiers).await
}

/// Pipeline core over an already-scraped batch. Split out so tests can
/// inject postings and a recording notifier without any network.
pub async fn run_with_batch(
    config: &Config,
    options: &RunOptions,
    scraped: Vec<Posting>,
    notifiers: &[Box<dyn Notifier>],
) -> Result<RunStats> {
    let lock = RunLock::acquire(&config.paths.lock_file, config.lock.ttl_min)?.ok_or_else(|| {
        JobScoutError::RunLock(format!(
            "Run lock active, aborting: {}",
            config.paths.lock_file.display()
        ))
    })?;

    let stamp = now_iso();
    let now = parse_ts(&stamp).unwrap_or_else(Utc::now);

    let loaded = load_state(&config.paths.state_file, &config.paths.seen_file, &stamp);
    let migrated_from_seen = loaded.migrated_from_seen();
    let mut state = loaded.records;

    let tracker_rows = load_tracker(&config.paths.tracker_file);
    let tracker_updates = apply_tracker_marks(&mut state, &tracker_rows, &stamp);
    if tracker_updates > 0 {
        info!("Applied {} manual tracker edits", tracker_updates);
    }
    let closed_aggregators = close_aggregator_records(&mut state, &config.mail.aggregator_sources);
    if closed_aggregators > 0 {
        info!("Closed {} aggregator records", closed_aggregators);
    }

    let scraped_total = scraped.len();
    if scraped.is_empty() {
        let stats = RunStats {
            scraped_total,
            state_total: state.len(),
            applied_count: count_status(&state, Status::Applied),
            ignored_count: count_status(&state, Status::Ignored),
            migrated_from_seen,
            dry_run: options.dry_run,
            ..RunStats::default()
        };
        if migrated_from_seen || tracker_updates > 0 || closed_aggregators > 0 {
            save_state(&state, &config.paths.state_file)?;
        }
        write_tracker(&state, &config.paths.tracker_file, &tracker_rows, false)?;
        lock.release();
        return Ok(stats);
    }

    export_json(&scraped, &config.paths.export_file)?;

    let payload = payload_from_postings(scraped, config.mail.min_score);
    let unique_total = payload.len();

    let policy = ClosePolicy {
        close_missing_runs: config.mail.close_missing_runs,
        close_not_seen_days: config.mail.close_not_seen_days,
    };
    let outcome = reconcile(&payload, &mut state, &stamp, now, &policy);

    let classified = classify(
        &state,
        &outcome.seen_this_run,
        now,
        config.mail.reminder_days,
        config.mail.daily_reminders,
    );

    let active_seen_this_run = outcome
        .seen_this_run
        .iter()
        .filter(|uid| state.get(*uid).map(|r| !r.status.is_terminal()).unwrap_or(false))
        .count();

    let (send_jobs, send_reminders) = if options.send_open {
        (classified.open_jobs, Vec::new())
    } else {
        (classified.new_jobs, classified.reminder_jobs)
    };

    let (mailed_new_count, mailed_reminder_count, mail_sent) = maybe_send(
        &mut state,
        &send_jobs,
        &send_reminders,
        &stamp,
        options.dry_run,
        notifiers,
    )
    .await;

    save_state(&state, &config.paths.state_file)?;
    write_tracker(&state, &config.paths.tracker_file, &tracker_rows, false)?;

    let stats = RunStats {
        scraped_total,
        unique_total,
        state_total: state.len(),
        newly_added: outcome.newly_added,
        active_seen_this_run,
        mailed_new_count,
        mailed_reminder_count,
        marked_closed_count: outcome.newly_closed,
        applied_count: count_status(&state, Status::Applied),
        ignored_count: count_status(&state, Status::Ignored),
        migrated_from_seen,
        dry_run: options.dry_run,
        mail_sent,
    };

    info!(
        "Run stats: {}",
        stats
            .counter_lines()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ")
    );

    lock.release();
    Ok(stats)
}

/// Dispatch the digest and apply the post-send contract. A dry run reports
/// what would go out; a failed or skipped send leaves every record untouched
/// so the next run retries the same set.
async fn maybe_send(
    state: &mut StateMap,
    send_jobs: &[String],
    send_reminders: &[String],
    stamp: &str,
    dry_run: bool,
    notifiers: &[Box<dyn Notifier>],
) -> (usize, usize, bool) {
    if send_jobs.is_empty() && send_reminders.is_empty() {
        return (0, 0, false);
    }

    if dry_run {
        info!(
            "[dry run] would send {} new, {} reminders",
            send_jobs.len(),
            send_reminders.len()
        );
        return (send_jobs.len(), send_reminders.len(), false);
    }

    let digest = build_digest(state, send_jobs, send_reminders);
    if !dispatch(notifiers, &digest).await {
        info!("Digest not delivered; state left untouched");
        return (0, 0, false);
    }

    mark_notified(state, send_jobs, stamp);
    mark_notified(state, send_reminders, stamp);
    (send_jobs.len(), send_reminders.len(), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::posting::MatchLabel;

    fn posting(title: &str, score: i64) -> Posting {
        let mut posting = Posting::new(title, "Acme AG", "Zuerich", "", "jobs.ch");
        posting.score = score;
        posting.match_label = MatchLabel::Good;
        posting
    }

    #[test]
    fn test_payload_filter_keeps_qualified() {
        let payload = payload_from_postings(
            vec![posting("high", 30), posting("low", 0), posting("mid", 10)],
            2,
        );
        assert_eq!(payload.len(), 2);
        assert!(payload.iter().all(|p| p.score >= 2));
    }

    #[test]
    fn test_payload_filter_falls_back_to_first_ten() {
        let batch: Vec<Posting> = (0..15).map(|i| posting(&format!("job {}", i), 0)).collect();
        let payload = payload_from_postings(batch, 2);
        assert_eq!(payload.len(), 10);
        assert_eq!(payload[0].title, "job 0");
    }

    #[test]
    fn test_close_aggregator_records_spares_terminal() {
        use crate::state::store::StateRecord;

        let mut state = StateMap::new();
        let mut agg = StateRecord::new("a", "2025-06-01T08:00:00Z");
        agg.source = "Careerjet".to_string();
        agg.status = Status::Notified;
        state.insert("a".to_string(), agg);

        let mut applied = StateRecord::new("b", "2025-06-01T08:00:00Z");
        applied.source = "careerjet".to_string();
        applied.status = Status::Applied;
        state.insert("b".to_string(), applied);

        let mut direct = StateRecord::new("c", "2025-06-01T08:00:00Z");
        direct.source = "jobs.ch".to_string();
        direct.status = Status::Notified;
        state.insert("c".to_string(), direct);

        let closed = close_aggregator_records(&mut state, &["careerjet".to_string()]);
        assert_eq!(closed, 1);
        assert_eq!(state["a"].status, Status::Closed);
        assert_eq!(state["b"].status, Status::Applied);
        assert_eq!(state["c"].status, Status::Notified);
    }
}
