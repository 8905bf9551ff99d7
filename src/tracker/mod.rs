//! Tracker bridge: human-editable CSV mirror of the state store
//!
//! The tracker is read before reconciliation to absorb manual status edits
//! and rewritten afterwards. Columns the user owns (erledigt, aktion, notes)
//! are carried over verbatim; the automation never clobbers them.

use crate::error::Result;
use crate::state::clock::parse_ts;
use crate::state::store::{StateMap, Status};
use log::warn;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

pub const TRACKER_HEADERS: &[&str] = &[
    "job_uid",
    "status",
    "applied_at",
    "erledigt",
    "aktion",
    "title",
    "company",
    "location",
    "source",
    "link",
    "first_seen_at",
    "last_seen_at",
    "last_sent_at",
    "score",
    "match",
    "notes",
];

pub const CHECKBOX_EMPTY: &str = "\u{2610}";
pub const CHECKBOX_DONE: &str = "\u{2611}";

const MANUAL_COLUMNS: &[&str] = &["erledigt", "aktion", "notes"];
const TRUTHY: &[&str] = &["1", "true", "t", "yes", "y", "ja", "j", "x"];
const FALSY: &[&str] = &["0", "false", "no", "nein"];
const APPLIED_ACTIONS: &[&str] = &["applied", "apply", "done", "sent", "bewerbung", "gesendet"];
const IGNORED_ACTIONS: &[&str] = &["ignored", "ignore", "skip", "no", "nein"];

pub type TrackerRow = HashMap<String, String>;
pub type TrackerRows = BTreeMap<String, TrackerRow>;

fn cell<'a>(row: &'a TrackerRow, key: &str) -> &'a str {
    row.get(key).map(|v| v.trim()).unwrap_or("")
}

/// Normalize the erledigt cell to a checkbox glyph where possible; values we
/// do not recognize pass through untouched.
fn normalize_done(value: &str) -> String {
    let raw = value.trim();
    if raw.is_empty() {
        return CHECKBOX_EMPTY.to_string();
    }
    if raw == CHECKBOX_EMPTY || raw == CHECKBOX_DONE {
        return raw.to_string();
    }
    let lowered = raw.to_lowercase();
    if TRUTHY.contains(&lowered.as_str()) {
        return CHECKBOX_DONE.to_string();
    }
    if FALSY.contains(&lowered.as_str()) {
        return CHECKBOX_EMPTY.to_string();
    }
    raw.to_string()
}

/// Read the tracker file into rows keyed by UID. Missing or malformed files
/// yield an empty map; tracker reconciliation is optional by design.
pub fn load_tracker(path: &Path) -> TrackerRows {
    if !path.exists() {
        return TrackerRows::new();
    }
    let mut reader = match csv::Reader::from_path(path) {
        Ok(reader) => reader,
        Err(err) => {
            warn!("Tracker file unreadable ({}): {}", path.display(), err);
            return TrackerRows::new();
        }
    };

    let headers: Vec<String> = match reader.headers() {
        Ok(headers) => headers.iter().map(|h| h.trim().to_string()).collect(),
        Err(_) => return TrackerRows::new(),
    };
    if !headers.iter().any(|h| h == "job_uid") {
        return TrackerRows::new();
    }

    let mut rows = TrackerRows::new();
    for record in reader.records().flatten() {
        let mut row = TrackerRow::new();
        for (idx, header) in headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            let value = record.get(idx).unwrap_or("").trim().to_string();
            row.insert(header.clone(), value);
        }
        let uid = cell(&row, "job_uid").to_string();
        if uid.is_empty() {
            continue;
        }
        rows.insert(uid, row);
    }
    rows
}

/// Apply manual status edits from tracker rows back onto the state store.
/// Rows without a matching record are ignored; the tracker can never create
/// state. Returns the number of records updated.
pub fn apply_tracker_marks(state: &mut StateMap, rows: &TrackerRows, stamp: &str) -> usize {
    let mut updates = 0;
    for (uid, row) in rows {
        let record = match state.get_mut(uid) {
            Some(record) => record,
            None => continue,
        };

        let action = cell(row, "aktion").to_lowercase();
        let done = normalize_done(cell(row, "erledigt"));

        let desired = if APPLIED_ACTIONS.contains(&action.as_str()) {
            Some(Status::Applied)
        } else if IGNORED_ACTIONS.contains(&action.as_str()) {
            Some(Status::Ignored)
        } else if done == CHECKBOX_DONE {
            Some(Status::Applied)
        } else {
            None
        };

        if let Some(desired) = desired {
            if record.status != desired {
                record.status = desired;
                if desired == Status::Applied {
                    record.applied_at = Some(stamp.to_string());
                } else {
                    record.applied_at = None;
                }
                updates += 1;
            }
        }
    }
    updates
}

/// One row per non-closed record (closed included on request), newest first.
pub fn build_tracker_rows(
    state: &StateMap,
    existing_rows: &TrackerRows,
    include_closed: bool,
) -> Vec<TrackerRow> {
    let mut rows = Vec::new();

    for (uid, record) in state {
        if record.status == Status::Closed && !include_closed {
            continue;
        }

        let mut row: TrackerRow = TRACKER_HEADERS
            .iter()
            .map(|h| (h.to_string(), String::new()))
            .collect();
        row.insert("job_uid".to_string(), uid.clone());
        row.insert("status".to_string(), record.status.as_str().to_string());
        row.insert(
            "applied_at".to_string(),
            record.applied_at.clone().unwrap_or_default(),
        );
        row.insert("erledigt".to_string(), CHECKBOX_EMPTY.to_string());
        row.insert("title".to_string(), record.title.clone());
        row.insert("company".to_string(), record.company.clone());
        row.insert("location".to_string(), record.location.clone());
        row.insert("source".to_string(), record.source.clone());
        let link = if record.link.is_empty() {
            record.canonical_url.clone()
        } else {
            record.link.clone()
        };
        row.insert("link".to_string(), link);
        row.insert("first_seen_at".to_string(), record.first_seen_at.clone());
        row.insert("last_seen_at".to_string(), record.last_seen_at.clone());
        row.insert(
            "last_sent_at".to_string(),
            record.last_sent_at.clone().unwrap_or_default(),
        );
        row.insert("score".to_string(), format_score(record.score));
        row.insert("match".to_string(), record.match_label.clone());

        if let Some(existing) = existing_rows.get(uid) {
            for column in MANUAL_COLUMNS {
                let value = cell(existing, column);
                if value.is_empty() {
                    continue;
                }
                let value = if *column == "erledigt" {
                    normalize_done(value)
                } else {
                    value.to_string()
                };
                row.insert(column.to_string(), value);
            }
        }

        if record.status.is_user_terminal() {
            row.insert("erledigt".to_string(), CHECKBOX_DONE.to_string());
            if cell(&row, "aktion").is_empty() {
                let action = match record.status {
                    Status::Applied => "applied",
                    _ => "ignored",
                };
                row.insert("aktion".to_string(), action.to_string());
            }
        }

        rows.push(row);
    }

    rows.sort_by(|a, b| {
        let ts_a = parse_ts(cell(a, "last_seen_at")).map(|t| t.timestamp()).unwrap_or(0);
        let ts_b = parse_ts(cell(b, "last_seen_at")).map(|t| t.timestamp()).unwrap_or(0);
        ts_b.cmp(&ts_a).then_with(|| cell(a, "job_uid").cmp(cell(b, "job_uid")))
    });
    rows
}

fn format_score(score: Option<f64>) -> String {
    match score {
        Some(s) if s.fract() == 0.0 => format!("{}", s as i64),
        Some(s) => format!("{}", s),
        None => String::new(),
    }
}

/// Rewrite the tracker file from the current state.
pub fn write_tracker(
    state: &StateMap,
    path: &Path,
    existing_rows: &TrackerRows,
    include_closed: bool,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let rows = build_tracker_rows(state, existing_rows, include_closed);

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(TRACKER_HEADERS)?;
    for row in &rows {
        let record: Vec<&str> = TRACKER_HEADERS
            .iter()
            .map(|h| row.get(*h).map(|v| v.as_str()).unwrap_or(""))
            .collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}
