//! Persisted job state: one record per job UID, survives across runs

use crate::error::{JobScoutError, Result};
use crate::state::identity::{build_job_uid, legacy_uid, PostingIdentity};
use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    New,
    Notified,
    Applied,
    Ignored,
    Closed,
}

impl Status {
    /// Open statuses are still eligible for notifications and reminders.
    pub fn is_open(self) -> bool {
        matches!(self, Status::New | Status::Notified)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Applied | Status::Ignored | Status::Closed)
    }

    /// Statuses set by the user; the reconciler must never override these.
    pub fn is_user_terminal(self) -> bool {
        matches!(self, Status::Applied | Status::Ignored)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::New => "new",
            Status::Notified => "notified",
            Status::Applied => "applied",
            Status::Ignored => "ignored",
            Status::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateRecord {
    #[serde(default)]
    pub job_uid: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub canonical_url: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub first_seen_at: String,
    #[serde(default)]
    pub last_seen_at: String,
    #[serde(default)]
    pub last_sent_at: Option<String>,
    #[serde(default = "default_status")]
    pub status: Status,
    #[serde(default, deserialize_with = "lenient_score")]
    pub score: Option<f64>,
    #[serde(default, rename = "match")]
    pub match_label: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub commute_min: Option<i64>,
    #[serde(default)]
    pub missing_runs: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_key: Option<String>,
}

fn default_status() -> Status {
    Status::New
}

/// Scores arrive as numbers from the scraper but legacy files carry numeric
/// strings or empty strings; anything unparseable is simply absent.
fn lenient_score<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

impl StateRecord {
    pub fn new(job_uid: &str, stamp: &str) -> Self {
        Self {
            job_uid: job_uid.to_string(),
            source: String::new(),
            canonical_url: String::new(),
            link: String::new(),
            title: String::new(),
            company: String::new(),
            location: String::new(),
            first_seen_at: stamp.to_string(),
            last_seen_at: stamp.to_string(),
            last_sent_at: None,
            status: Status::New,
            score: None,
            match_label: String::new(),
            date: String::new(),
            commute_min: None,
            missing_runs: 0,
            applied_at: None,
            legacy_key: None,
        }
    }

    /// Numeric score for sorting; missing or unparseable counts as 0.
    pub fn score_value(&self) -> f64 {
        self.score.unwrap_or(0.0)
    }
}

pub type StateMap = BTreeMap<String, StateRecord>;

/// Where the loaded state actually came from, so callers can tell an empty
/// store apart from a failed read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOrigin {
    /// Parsed from the primary state file.
    Loaded,
    /// Primary file held the legacy array format.
    LegacyList,
    /// Migrated from the legacy seen-jobs file.
    MigratedSeen,
    /// No state or seen-jobs file present.
    Missing,
    /// A file existed but could not be parsed; store starts empty.
    Unreadable,
}

#[derive(Debug)]
pub struct LoadedState {
    pub records: StateMap,
    pub origin: StateOrigin,
}

impl LoadedState {
    pub fn migrated_from_seen(&self) -> bool {
        self.origin == StateOrigin::MigratedSeen
    }
}

/// Load the state store. Never fails: unreadable files yield an empty store
/// with `StateOrigin::Unreadable`, which the next save simply regenerates.
pub fn load_state(path: &Path, seen_path: &Path, now: &str) -> LoadedState {
    if path.exists() {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("State file unreadable ({}): {}", path.display(), err);
                return LoadedState {
                    records: StateMap::new(),
                    origin: StateOrigin::Unreadable,
                };
            }
        };
        return parse_state(&raw, path);
    }

    if seen_path.exists() {
        return migrate_seen_jobs(seen_path, now);
    }

    LoadedState {
        records: StateMap::new(),
        origin: StateOrigin::Missing,
    }
}

fn parse_state(raw: &str, path: &Path) -> LoadedState {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            warn!("State file corrupt ({}): {}", path.display(), err);
            return LoadedState {
                records: StateMap::new(),
                origin: StateOrigin::Unreadable,
            };
        }
    };

    match value {
        Value::Object(map) => {
            let mut records = StateMap::new();
            for (uid, entry) in map {
                match serde_json::from_value::<StateRecord>(entry) {
                    Ok(mut record) => {
                        if record.job_uid.is_empty() {
                            record.job_uid = uid.clone();
                        }
                        records.insert(uid, record);
                    }
                    Err(err) => warn!("Skipping malformed state record {}: {}", uid, err),
                }
            }
            LoadedState {
                records,
                origin: StateOrigin::Loaded,
            }
        }
        Value::Array(items) => {
            // Legacy format: a flat list of records carrying their own UID.
            let mut records = StateMap::new();
            for item in items {
                if let Ok(record) = serde_json::from_value::<StateRecord>(item) {
                    if !record.job_uid.is_empty() {
                        records.insert(record.job_uid.clone(), record);
                    }
                }
            }
            LoadedState {
                records,
                origin: StateOrigin::LegacyList,
            }
        }
        _ => {
            warn!("State file has unexpected shape: {}", path.display());
            LoadedState {
                records: StateMap::new(),
                origin: StateOrigin::Unreadable,
            }
        }
    }
}

/// Migrate the old seen-jobs list (posting dicts or bare identity strings)
/// into state records that count as already notified.
fn migrate_seen_jobs(seen_path: &Path, now: &str) -> LoadedState {
    let raw = match std::fs::read_to_string(seen_path) {
        Ok(raw) => raw,
        Err(_) => {
            return LoadedState {
                records: StateMap::new(),
                origin: StateOrigin::Unreadable,
            }
        }
    };
    let value: Value = match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(err) => {
            warn!("Seen-jobs file corrupt ({}): {}", seen_path.display(), err);
            return LoadedState {
                records: StateMap::new(),
                origin: StateOrigin::Unreadable,
            };
        }
    };

    let entries: Vec<Value> = match value {
        Value::Array(items) => items,
        Value::Object(map) => map.keys().cloned().map(Value::String).collect(),
        _ => Vec::new(),
    };

    let mut records = StateMap::new();
    for entry in entries {
        let record = match &entry {
            Value::Object(_) => {
                let identity = PostingIdentity::from_value(&entry);
                let (job_uid, canonical_url) = build_job_uid(&identity);
                let mut record = StateRecord::new(&job_uid, now);
                record.source = identity.source;
                record.canonical_url = canonical_url;
                record.link = identity.link;
                record.title = identity.title;
                record.company = identity.company;
                record.location = identity.location;
                record.status = Status::Notified;
                record.last_sent_at = Some(now.to_string());
                record
            }
            other => {
                let key = match other {
                    Value::String(s) => s.clone(),
                    v => v.to_string(),
                };
                let job_uid = legacy_uid(&key);
                let mut record = StateRecord::new(&job_uid, now);
                record.source = "legacy".to_string();
                record.status = Status::Notified;
                record.last_sent_at = Some(now.to_string());
                record.legacy_key = Some(key);
                record
            }
        };
        records.insert(record.job_uid.clone(), record);
    }

    LoadedState {
        records,
        origin: StateOrigin::MigratedSeen,
    }
}

/// Persist the store as pretty-printed JSON, UIDs sorted. Written to a
/// temp file in the target directory and renamed so a crash mid-write never
/// leaves a truncated store behind.
pub fn save_state(state: &StateMap, path: &Path) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let payload = serde_json::to_string_pretty(state)?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(payload.as_bytes())?;
    tmp.persist(path).map_err(|e| JobScoutError::Io(e.error))?;
    Ok(())
}

/// Count records currently in the given status.
pub fn count_status(state: &StateMap, status: Status) -> usize {
    state.values().filter(|r| r.status == status).count()
}
