//! Digest formatting and notification dispatch

use crate::config::WhatsAppConfig;
use crate::error::{JobScoutError, Result};
use crate::state::store::StateMap;
use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use serde_json::json;

/// WhatsApp caps text messages; longer digests are cut, not split.
const MAX_MESSAGE_LEN: usize = 4000;

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;
    fn enabled(&self) -> bool;
    async fn send(&self, digest: &str) -> Result<()>;
}

/// Plain-text digest over the new and reminder groups.
pub fn build_digest(state: &StateMap, new_jobs: &[String], reminder_jobs: &[String]) -> String {
    let mut lines = Vec::new();

    if !new_jobs.is_empty() {
        lines.push(format!("Neue Jobs ({}):", new_jobs.len()));
        append_job_lines(&mut lines, state, new_jobs);
    }
    if !reminder_jobs.is_empty() {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push(format!("Erinnerungen ({}):", reminder_jobs.len()));
        append_job_lines(&mut lines, state, reminder_jobs);
    }

    lines.join("\n")
}

fn append_job_lines(lines: &mut Vec<String>, state: &StateMap, uids: &[String]) {
    for uid in uids {
        let record = match state.get(uid) {
            Some(record) => record,
            None => continue,
        };
        let mut line = format!("- {}", record.title);
        if !record.company.is_empty() {
            line.push_str(&format!(" | {}", record.company));
        }
        if !record.location.is_empty() {
            line.push_str(&format!(" | {}", record.location));
        }
        line.push_str(&format!(" (Score {})", record.score_value() as i64));
        lines.push(line);
        if !record.link.is_empty() {
            lines.push(format!("  {}", record.link));
        }
    }
}

/// Send the digest through every enabled notifier. Returns true once at
/// least one delivery succeeded; false means nothing was sent and the
/// caller must leave the state untouched.
pub async fn dispatch(notifiers: &[Box<dyn Notifier>], digest: &str) -> bool {
    let mut sent = false;
    for notifier in notifiers {
        if !notifier.enabled() {
            continue;
        }
        match notifier.send(digest).await {
            Ok(()) => {
                info!("{}: digest delivered", notifier.name());
                sent = true;
            }
            Err(err) => warn!("{}: delivery failed: {}", notifier.name(), err),
        }
    }
    sent
}

/// WhatsApp Cloud API text message sender.
pub struct WhatsAppNotifier {
    config: WhatsAppConfig,
    client: Client,
}

impl WhatsAppNotifier {
    pub fn new(config: WhatsAppConfig, client: Client) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl Notifier for WhatsAppNotifier {
    fn name(&self) -> &'static str {
        "whatsapp"
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    async fn send(&self, digest: &str) -> Result<()> {
        if self.config.token.is_empty()
            || self.config.phone_id.is_empty()
            || self.config.to.is_empty()
        {
            return Err(JobScoutError::Notification(
                "WhatsApp config incomplete: token/phone_id/to required".to_string(),
            ));
        }

        let body: String = digest.chars().take(MAX_MESSAGE_LEN).collect();
        let url = format!(
            "https://graph.facebook.com/v21.0/{}/messages",
            self.config.phone_id
        );
        let payload = json!({
            "messaging_product": "whatsapp",
            "to": self.config.to,
            "type": "text",
            "text": {"body": body},
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.token)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(JobScoutError::Notification(format!(
                "WhatsApp API returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
