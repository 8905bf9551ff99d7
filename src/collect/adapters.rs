//! Portal adapters: thin HTML/JSON-LD scrapers per Swiss job portal
//!
//! Adapters fail soft per portal; selector robustness is best-effort.

use crate::collect::posting::Posting;
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use url::Url;

pub const USER_AGENT: &str = "job-scout/0.1 (+job-collector)";

#[async_trait]
pub trait PortalAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    fn search_url(&self, keyword: &str, location: &str) -> String;

    async fn fetch(
        &self,
        client: &Client,
        keyword: &str,
        location: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Posting>>;
}

pub fn default_adapters() -> Vec<Box<dyn PortalAdapter>> {
    vec![Box::new(JobsChAdapter), Box::new(JobupAdapter)]
}

pub struct JobsChAdapter;

#[async_trait]
impl PortalAdapter for JobsChAdapter {
    fn name(&self) -> &'static str {
        "jobs.ch"
    }

    fn search_url(&self, keyword: &str, location: &str) -> String {
        build_search_url("https://www.jobs.ch/de/stellenangebote/", keyword, location)
    }

    async fn fetch(
        &self,
        client: &Client,
        keyword: &str,
        location: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Posting>> {
        let html = fetch_html(client, &self.search_url(keyword, location)).await?;
        Ok(parse_result_page(&html, self.name(), "https://www.jobs.ch", limit))
    }
}

pub struct JobupAdapter;

#[async_trait]
impl PortalAdapter for JobupAdapter {
    fn name(&self) -> &'static str {
        "jobup"
    }

    fn search_url(&self, keyword: &str, location: &str) -> String {
        build_search_url("https://www.jobup.ch/de/jobs/", keyword, location)
    }

    async fn fetch(
        &self,
        client: &Client,
        keyword: &str,
        location: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Posting>> {
        let html = fetch_html(client, &self.search_url(keyword, location)).await?;
        Ok(parse_result_page(&html, self.name(), "https://www.jobup.ch", limit))
    }
}

fn build_search_url(base: &str, keyword: &str, location: &str) -> String {
    match Url::parse(base) {
        Ok(mut url) => {
            url.query_pairs_mut()
                .append_pair("term", keyword)
                .append_pair("location", location);
            url.to_string()
        }
        Err(_) => base.to_string(),
    }
}

async fn fetch_html(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch {}", url))?;

    if !response.status().is_success() {
        anyhow::bail!("HTTP {} for {}", response.status(), url);
    }

    response.text().await.context("Failed to read response body")
}

/// Parse a search result page: job cards first, JSON-LD as fallback.
pub(crate) fn parse_result_page(
    html: &str,
    source: &str,
    base_url: &str,
    limit: Option<usize>,
) -> Vec<Posting> {
    let document = Html::parse_document(html);

    let mut postings = parse_job_cards(&document, source, base_url);
    if postings.is_empty() {
        postings = parse_jsonld_postings(html, source);
    }
    if let Some(limit) = limit {
        postings.truncate(limit);
    }
    postings
}

const CARD_SELECTORS: &[&str] = &[
    "article[data-cy='serp-item']",
    "div[data-cy='vacancy-serp-item']",
    "article.job-result",
    "li[data-cy='search-result']",
];

const TITLE_SELECTORS: &[&str] = &[
    "[data-cy='job-title']",
    "h2 a",
    "h2",
    "[class*='job-title']",
    "[class*='title']",
];

const COMPANY_SELECTORS: &[&str] = &[
    "[data-cy='company-name']",
    "[class*='company']",
    "[class*='employer']",
];

const LOCATION_SELECTORS: &[&str] = &[
    "[data-cy='job-location']",
    "[class*='location']",
    "[class*='place']",
];

fn parse_job_cards(document: &Html, source: &str, base_url: &str) -> Vec<Posting> {
    let mut postings = Vec::new();

    for card_selector in CARD_SELECTORS {
        let selector = match Selector::parse(card_selector) {
            Ok(selector) => selector,
            Err(_) => continue,
        };
        for card in document.select(&selector) {
            let title = match find_text_by_selectors(card, TITLE_SELECTORS) {
                Some(title) => title,
                None => continue,
            };
            let company = find_text_by_selectors(card, COMPANY_SELECTORS).unwrap_or_default();
            let location = find_text_by_selectors(card, LOCATION_SELECTORS).unwrap_or_default();
            let link = find_detail_link(card, base_url).unwrap_or_default();

            postings.push(Posting::new(&title, &company, &location, &link, source));
        }
        if !postings.is_empty() {
            break;
        }
    }

    postings
}

fn find_text_by_selectors(element: ElementRef<'_>, selectors: &[&str]) -> Option<String> {
    for selector_str in selectors {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(found) = element.select(&selector).next() {
                let text = clean_text(&found.text().collect::<Vec<_>>().join(" "));
                if text.len() > 2 {
                    return Some(text);
                }
            }
        }
    }
    None
}

fn find_detail_link(card: ElementRef<'_>, base_url: &str) -> Option<String> {
    let anchor = Selector::parse("a[href]").ok()?;
    for a in card.select(&anchor) {
        let href = a.value().attr("href")?;
        let absolute = match Url::parse(base_url).and_then(|base| base.join(href)) {
            Ok(url) => url.to_string(),
            Err(_) => href.to_string(),
        };
        if is_detail_link(&absolute) {
            return Some(absolute);
        }
    }
    None
}

/// Heuristic for detail pages: typical detail paths, GUIDs, long numeric ids.
pub(crate) fn is_detail_link(link: &str) -> bool {
    if link.is_empty() {
        return false;
    }
    let lower = link.to_lowercase();
    if lower.contains("/detail/") || lower.contains("/job/") || lower.contains("/jobad/") {
        return true;
    }
    let guid = Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
        .expect("Invalid GUID regex");
    if guid.is_match(&lower) {
        return true;
    }
    let numeric_id = Regex::new(r"/\d{6,}(/|$)").expect("Invalid id regex");
    numeric_id.is_match(&lower)
}

/// Extract JobPosting objects from embedded JSON-LD script tags.
pub(crate) fn parse_jsonld_postings(html: &str, source: &str) -> Vec<Posting> {
    let document = Html::parse_document(html);
    let selector = match Selector::parse("script[type='application/ld+json']") {
        Ok(selector) => selector,
        Err(_) => return Vec::new(),
    };

    let mut postings = Vec::new();
    for script in document.select(&selector) {
        let chunk = script.text().collect::<String>();
        let data: Value = match serde_json::from_str(chunk.trim()) {
            Ok(data) => data,
            Err(_) => continue,
        };

        let mut stack: Vec<Value> = match data {
            Value::Array(items) => items,
            other => vec![other],
        };
        while let Some(obj) = stack.pop() {
            if let Some(graph) = obj.get("@graph").and_then(|g| g.as_array()) {
                stack.extend(graph.iter().cloned());
                continue;
            }
            if !is_job_posting(&obj) {
                continue;
            }
            if let Some(posting) = posting_from_jsonld(&obj, source) {
                postings.push(posting);
            }
        }
    }
    postings
}

fn is_job_posting(obj: &Value) -> bool {
    match obj.get("@type") {
        Some(Value::String(t)) => t == "JobPosting",
        Some(Value::Array(types)) => types.iter().any(|t| t == "JobPosting"),
        _ => false,
    }
}

fn posting_from_jsonld(obj: &Value, source: &str) -> Option<Posting> {
    let title = clean_text(obj.get("title")?.as_str()?);
    if title.is_empty() {
        return None;
    }
    let company = obj
        .pointer("/hiringOrganization/name")
        .and_then(|v| v.as_str())
        .map(clean_text)
        .unwrap_or_default();
    let location = obj
        .pointer("/jobLocation/address/addressLocality")
        .or_else(|| obj.pointer("/jobLocation/0/address/addressLocality"))
        .and_then(|v| v.as_str())
        .map(clean_text)
        .unwrap_or_default();
    let link = obj
        .get("url")
        .or_else(|| obj.get("directApply"))
        .and_then(|v| v.as_str())
        .unwrap_or_default();

    let mut posting = Posting::new(&title, &company, &location, link, source);
    if let Some(date) = obj.get("datePosted").and_then(|v| v.as_str()) {
        posting.date = date.to_string();
    }
    Some(posting)
}

fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
