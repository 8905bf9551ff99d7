//! Canonical scraped posting and in-batch deduplication

use crate::state::identity::PostingIdentity;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchLabel {
    Exact,
    Good,
    Weak,
    Unknown,
}

impl std::fmt::Display for MatchLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            MatchLabel::Exact => "exact",
            MatchLabel::Good => "good",
            MatchLabel::Weak => "weak",
            MatchLabel::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// One job advertisement as scraped from a portal, scored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Posting {
    pub raw_title: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub link: String,
    pub source: String,
    pub score: i64,
    #[serde(rename = "match")]
    pub match_label: MatchLabel,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub commute_min: Option<i64>,
}

impl Posting {
    pub fn new(title: &str, company: &str, location: &str, link: &str, source: &str) -> Self {
        Self {
            raw_title: title.to_string(),
            title: title.to_string(),
            company: company.to_string(),
            location: location.to_string(),
            link: link.to_string(),
            source: source.to_string(),
            score: 0,
            match_label: MatchLabel::Unknown,
            date: String::new(),
            commute_min: None,
        }
    }
}

impl From<&Posting> for PostingIdentity {
    fn from(posting: &Posting) -> Self {
        PostingIdentity {
            source: posting.source.clone(),
            link: posting.link.clone(),
            external_id: String::new(),
            title: posting.title.clone(),
            company: posting.company.clone(),
            location: posting.location.clone(),
        }
    }
}

/// Collapse a scraped batch by normalized title/company/link. First hit wins,
/// so adapter ordering decides which duplicate survives.
pub fn dedupe_postings(postings: Vec<Posting>) -> Vec<Posting> {
    let non_word = Regex::new(r"\W+").expect("Invalid dedupe regex");
    let mut seen = std::collections::HashSet::new();
    let mut unique = Vec::with_capacity(postings.len());

    for posting in postings {
        let title_lower = posting.title.to_lowercase();
        let title = non_word.replace_all(&title_lower, "");
        let company_lower = posting.company.to_lowercase();
        let company = non_word.replace_all(&company_lower, "");
        let link = posting
            .link
            .to_lowercase()
            .split(['?', '#'])
            .next()
            .unwrap_or("")
            .to_string();
        let key = format!("{}|{}|{}", title, company, link);
        if seen.insert(key) {
            unique.push(posting);
        }
    }
    unique
}
