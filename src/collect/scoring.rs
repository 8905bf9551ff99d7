//! Keyword-based title scoring
//!
//! Advisory only: the state pipeline treats the score as an opaque number.

use crate::collect::posting::MatchLabel;
use crate::error::{JobScoutError, Result};
use aho_corasick::AhoCorasick;
use std::collections::HashSet;
use strsim::jaro_winkler;

const FUZZY_THRESHOLD: f64 = 0.92;

/// Scores titles against positive and negative keyword lists. Exact hits via
/// case-insensitive Aho-Corasick, with a Jaro-Winkler assist for close
/// single-word variants (Supportor, Helpdek, ...).
pub struct TitleScorer {
    positive_matcher: AhoCorasick,
    positive_terms: Vec<String>,
    negative_matcher: AhoCorasick,
    fuzzy_threshold: f64,
}

impl TitleScorer {
    pub fn new(positives: &[String], negatives: &[String]) -> Result<Self> {
        let positive_terms: Vec<String> = dedupe_terms(positives);
        let negative_terms: Vec<String> = dedupe_terms(negatives);

        let positive_matcher = build_matcher(&positive_terms)?;
        let negative_matcher = build_matcher(&negative_terms)?;

        Ok(Self {
            positive_matcher,
            positive_terms,
            negative_matcher,
            fuzzy_threshold: FUZZY_THRESHOLD,
        })
    }

    /// Score a title: distinct positive hits x10, distinct negative hits x-20.
    pub fn score(&self, title: &str) -> (i64, MatchLabel) {
        let positive_hits = self.positive_hits(title);
        let negative_hits = distinct_hits(&self.negative_matcher, title);

        let score = positive_hits as i64 * 10 - negative_hits as i64 * 20;
        let label = if positive_hits >= 2 && negative_hits == 0 {
            MatchLabel::Exact
        } else if positive_hits >= 1 && negative_hits == 0 {
            MatchLabel::Good
        } else {
            MatchLabel::Weak
        };
        (score, label)
    }

    fn positive_hits(&self, title: &str) -> usize {
        let mut hit_terms: HashSet<usize> = HashSet::new();
        for mat in self.positive_matcher.find_iter(title) {
            hit_terms.insert(mat.pattern().as_usize());
        }

        // Fuzzy assist: single-word terms that almost match a title word.
        for (idx, term) in self.positive_terms.iter().enumerate() {
            if hit_terms.contains(&idx) || term.contains(' ') {
                continue;
            }
            let term_lower = term.to_lowercase();
            for word in title.split_whitespace() {
                let clean: String = word
                    .chars()
                    .filter(|c| c.is_alphanumeric())
                    .collect::<String>()
                    .to_lowercase();
                if clean.len() < 4 {
                    continue;
                }
                if jaro_winkler(&clean, &term_lower) >= self.fuzzy_threshold {
                    hit_terms.insert(idx);
                    break;
                }
            }
        }

        hit_terms.len()
    }
}

fn build_matcher(terms: &[String]) -> Result<AhoCorasick> {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .match_kind(aho_corasick::MatchKind::LeftmostLongest)
        .build(terms)
        .map_err(|e| JobScoutError::Configuration(format!("Failed to build keyword matcher: {}", e)))
}

fn distinct_hits(matcher: &AhoCorasick, text: &str) -> usize {
    matcher
        .find_iter(text)
        .map(|m| m.pattern().as_usize())
        .collect::<HashSet<_>>()
        .len()
}

fn dedupe_terms(terms: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    terms
        .iter()
        .filter(|t| !t.trim().is_empty())
        .filter(|t| seen.insert(t.trim().to_lowercase()))
        .map(|t| t.trim().to_string())
        .collect()
}
