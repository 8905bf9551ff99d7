//! Stable posting identity: canonical URLs and content-addressed job UIDs
//!
//! The identity basis strings built here are a compatibility contract: any
//! change to their construction silently invalidates every persisted UID.

use serde_json::Value;
use sha2::{Digest, Sha256};
use url::Url;

/// Identity-relevant view of a posting, resolved from heterogeneous source
/// schemas at the system boundary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostingIdentity {
    pub source: String,
    pub link: String,
    pub external_id: String,
    pub title: String,
    pub company: String,
    pub location: String,
}

const SOURCE_KEYS: &[&str] = &["source", "portal", "origin", "site"];
const LINK_KEYS: &[&str] = &["link", "url", "apply_url", "applyLink"];
const ID_KEYS: &[&str] = &["external_id", "job_id", "id"];
const TITLE_KEYS: &[&str] = &["title", "job_title", "position"];
const COMPANY_KEYS: &[&str] = &["company", "employer"];
const LOCATION_KEYS: &[&str] = &["location", "city"];

impl PostingIdentity {
    /// Build from a dynamic record (legacy files, raw scrape exports).
    /// Missing fields degrade to empty strings; never fails.
    pub fn from_value(value: &Value) -> Self {
        Self {
            source: first_field(value, SOURCE_KEYS),
            link: first_field(value, LINK_KEYS),
            external_id: first_field(value, ID_KEYS),
            title: first_field(value, TITLE_KEYS),
            company: first_field(value, COMPANY_KEYS),
            location: first_field(value, LOCATION_KEYS),
        }
    }
}

fn first_field(value: &Value, keys: &[&str]) -> String {
    for key in keys {
        match value.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => return s.trim().to_string(),
            Some(Value::Number(n)) => return n.to_string(),
            _ => {}
        }
    }
    String::new()
}

/// Normalize a link for deduplication: scheme and host lowercased, query,
/// fragment and trailing slash stripped, path case preserved. Inputs that do
/// not parse as absolute URLs are returned trimmed as-is.
pub fn canonicalize_url(link: &str) -> String {
    let raw = link.trim();
    if raw.is_empty() {
        return String::new();
    }
    let parsed = match Url::parse(raw) {
        Ok(url) => url,
        Err(_) => return raw.to_string(),
    };
    let host = match parsed.host_str() {
        Some(host) => host.to_lowercase(),
        None => return raw.to_string(),
    };
    let mut path = parsed.path().to_string();
    if path.ends_with('/') && path != "/" {
        path.pop();
    }
    let port = parsed
        .port()
        .map(|p| format!(":{}", p))
        .unwrap_or_default();
    format!("{}://{}{}{}", parsed.scheme().to_lowercase(), host, port, path)
}

/// Lowercase, fold diacritics, keep only alphanumerics separated by single
/// spaces. Covers the Latin letters Swiss portals emit.
pub fn normalize_text(value: &str) -> String {
    let mut folded = String::with_capacity(value.len());
    for ch in value.to_lowercase().chars() {
        match ch {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => folded.push('a'),
            'è' | 'é' | 'ê' | 'ë' => folded.push('e'),
            'ì' | 'í' | 'î' | 'ï' => folded.push('i'),
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' => folded.push('o'),
            'ù' | 'ú' | 'û' | 'ü' => folded.push('u'),
            'ç' => folded.push('c'),
            'ñ' => folded.push('n'),
            'ß' => folded.push_str("ss"),
            c if c.is_ascii_alphanumeric() => folded.push(c),
            _ => folded.push(' '),
        }
    }
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Derive the stable `(job_uid, canonical_url)` pair for a posting.
///
/// Basis priority: canonical URL, then external ID, then normalized
/// title/company/location/link text. The source is always part of the basis,
/// so identical fallback fields from different portals cannot collide.
pub fn build_job_uid(identity: &PostingIdentity) -> (String, String) {
    let source = match identity.source.trim() {
        "" => "unknown",
        s => s,
    };
    let link = identity.link.trim();
    let canonical_url = canonicalize_url(link);

    let basis = if !canonical_url.is_empty() {
        format!("url|{}|{}", source, canonical_url)
    } else {
        let external_id = identity.external_id.trim();
        if !external_id.is_empty() {
            format!("id|{}|{}", source, external_id)
        } else {
            format!(
                "fallback|{}|{}|{}|{}|{}",
                source,
                normalize_text(&identity.title),
                normalize_text(&identity.company),
                normalize_text(&identity.location),
                normalize_text(link),
            )
        }
    };

    (digest16(&basis), canonical_url)
}

/// UID for a bare legacy seen-jobs key.
pub fn legacy_uid(key: &str) -> String {
    digest16(&format!("legacy|{}", key))
}

fn digest16(basis: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(basis.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}
