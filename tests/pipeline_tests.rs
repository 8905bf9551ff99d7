//! Integration tests for the reconciliation pipeline

use async_trait::async_trait;
use job_scout::collect::posting::{MatchLabel, Posting};
use job_scout::config::Config;
use job_scout::error::Result;
use job_scout::notify::Notifier;
use job_scout::pipeline::runner::{run_with_batch, RunOptions};
use job_scout::state::store::{load_state, Status};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Clone)]
struct RecordingNotifier {
    digests: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    fn new() -> Self {
        Self {
            digests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn sent_count(&self) -> usize {
        self.digests.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn enabled(&self) -> bool {
        true
    }

    async fn send(&self, digest: &str) -> Result<()> {
        self.digests.lock().unwrap().push(digest.to_string());
        Ok(())
    }
}

struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn enabled(&self) -> bool {
        true
    }

    async fn send(&self, _digest: &str) -> Result<()> {
        Err(job_scout::JobScoutError::Notification(
            "simulated outage".to_string(),
        ))
    }
}

fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.paths.state_file = dir.join("generated/job_state.json");
    config.paths.seen_file = dir.join("generated/seen_jobs.json");
    config.paths.tracker_file = dir.join("generated/job_tracker.csv");
    config.paths.export_file = dir.join("generated/jobs.json");
    config.paths.lock_file = dir.join("generated/mail_list.lock");
    config.whatsapp.enabled = false;
    config
}

fn batch() -> Vec<Posting> {
    ["IT Supporter", "Service Desk Agent", "ICT Supporter"]
        .iter()
        .enumerate()
        .map(|(i, title)| {
            let mut posting = Posting::new(
                title,
                "Acme AG",
                "Zuerich",
                &format!("https://example.com/job/{}", i + 1),
                "jobs.ch",
            );
            posting.score = 10;
            posting.match_label = MatchLabel::Good;
            posting
        })
        .collect()
}

#[tokio::test]
async fn test_three_run_lifecycle() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let recorder = RecordingNotifier::new();
    let notifiers: Vec<Box<dyn Notifier>> = vec![Box::new(recorder.clone())];

    // Run 1: everything is new, dry run leaves state unsent.
    let stats = run_with_batch(
        &config,
        &RunOptions {
            dry_run: true,
            send_open: false,
        },
        batch(),
        &notifiers,
    )
    .await
    .unwrap();

    assert_eq!(stats.newly_added, 3);
    assert_eq!(stats.mailed_new_count, 3);
    assert!(!stats.mail_sent);

    let state = load_state(&config.paths.state_file, &config.paths.seen_file, "now").records;
    assert_eq!(state.len(), 3);
    for record in state.values() {
        assert_eq!(record.status, Status::New);
        assert!(record.last_sent_at.is_none());
    }

    // Run 2: same batch, real send. All three go out and become notified.
    let stats = run_with_batch(&config, &RunOptions::default(), batch(), &notifiers)
        .await
        .unwrap();

    assert_eq!(stats.newly_added, 0);
    assert_eq!(stats.mailed_new_count, 3);
    assert_eq!(stats.mailed_reminder_count, 0);
    assert!(stats.mail_sent);
    assert_eq!(recorder.sent_count(), 1);

    let state = load_state(&config.paths.state_file, &config.paths.seen_file, "now").records;
    for record in state.values() {
        assert_eq!(record.status, Status::Notified);
        assert!(record.last_sent_at.is_some());
        assert_eq!(record.missing_runs, 0);
    }

    // Run 3: one posting vanishes with an aggressive closure policy.
    let mut config3 = config.clone();
    config3.mail.close_missing_runs = 1;
    let partial: Vec<Posting> = batch().into_iter().take(2).collect();

    let stats = run_with_batch(&config3, &RunOptions::default(), partial, &notifiers)
        .await
        .unwrap();
    assert_eq!(stats.marked_closed_count, 1);

    let state = load_state(&config.paths.state_file, &config.paths.seen_file, "now").records;
    let closed: Vec<_> = state.values().filter(|r| r.status == Status::Closed).collect();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].missing_runs, 1);
    assert_eq!(
        state.values().filter(|r| r.status == Status::Notified).count(),
        2
    );
}

#[tokio::test]
async fn test_failed_send_leaves_state_untouched() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let notifiers: Vec<Box<dyn Notifier>> = vec![Box::new(FailingNotifier)];

    let stats = run_with_batch(&config, &RunOptions::default(), batch(), &notifiers)
        .await
        .unwrap();

    assert!(!stats.mail_sent);
    assert_eq!(stats.mailed_new_count, 0);

    // At-least-once: records stay new, ready for the next attempt.
    let state = load_state(&config.paths.state_file, &config.paths.seen_file, "now").records;
    for record in state.values() {
        assert_eq!(record.status, Status::New);
        assert!(record.last_sent_at.is_none());
    }
}

#[tokio::test]
async fn test_tracker_marks_survive_runs() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let notifiers: Vec<Box<dyn Notifier>> = vec![Box::new(RecordingNotifier::new())];

    run_with_batch(&config, &RunOptions::default(), batch(), &notifiers)
        .await
        .unwrap();

    // Mark the first tracker row as applied, the way a user would.
    let tracker_raw = std::fs::read_to_string(&config.paths.tracker_file).unwrap();
    let mut lines: Vec<String> = tracker_raw.lines().map(|l| l.to_string()).collect();
    let header_cols: Vec<&str> = lines[0].split(',').collect();
    let action_idx = header_cols.iter().position(|c| *c == "aktion").unwrap();
    let mut row_cols: Vec<String> = lines[1].split(',').map(|c| c.to_string()).collect();
    row_cols[action_idx] = "applied".to_string();
    lines[1] = row_cols.join(",");
    std::fs::write(&config.paths.tracker_file, lines.join("\n")).unwrap();

    let stats = run_with_batch(&config, &RunOptions::default(), batch(), &notifiers)
        .await
        .unwrap();
    assert_eq!(stats.applied_count, 1);

    // The applied record is user-terminal: absent or present, it stays put.
    let stats = run_with_batch(&config, &RunOptions::default(), Vec::new(), &notifiers)
        .await
        .unwrap();
    assert_eq!(stats.applied_count, 1);

    let state = load_state(&config.paths.state_file, &config.paths.seen_file, "now").records;
    let applied: Vec<_> = state.values().filter(|r| r.status == Status::Applied).collect();
    assert_eq!(applied.len(), 1);
    assert!(applied[0].applied_at.is_some());
}

#[tokio::test]
async fn test_send_open_dispatches_notified_records_too() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let notifiers: Vec<Box<dyn Notifier>> = vec![Box::new(RecordingNotifier::new())];

    // First run sends everything as new.
    run_with_batch(&config, &RunOptions::default(), batch(), &notifiers)
        .await
        .unwrap();

    // Send-open mode re-dispatches open records regardless of reminder gating.
    let stats = run_with_batch(
        &config,
        &RunOptions {
            dry_run: false,
            send_open: true,
        },
        batch(),
        &notifiers,
    )
    .await
    .unwrap();

    assert!(stats.mail_sent);
    assert_eq!(stats.mailed_new_count, 3);
    assert_eq!(stats.mailed_reminder_count, 0);
}
