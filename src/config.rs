//! Configuration management for the job scout

use crate::error::{JobScoutError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub search: SearchConfig,
    pub mail: MailConfig,
    pub paths: PathsConfig,
    pub lock: LockConfig,
    pub whatsapp: WhatsAppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub keywords: Vec<String>,
    pub title_variants_de: Vec<String>,
    pub title_variants_en: Vec<String>,
    pub negative_keywords: Vec<String>,
    pub locations: Vec<String>,
    /// Cap per portal+query; 0 disables the cap.
    pub limit_per_site: usize,
    /// Cap across all portals; 0 disables the cap.
    pub max_total: usize,
    pub request_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub min_score: i64,
    pub reminder_days: i64,
    pub close_missing_runs: u32,
    pub close_not_seen_days: i64,
    pub daily_reminders: bool,
    /// Sources whose postings are aggregator re-posts; auto-closed in state.
    pub aggregator_sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub state_file: PathBuf,
    pub seen_file: PathBuf,
    pub tracker_file: PathBuf,
    pub export_file: PathBuf,
    pub lock_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    pub ttl_min: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    pub enabled: bool,
    pub token: String,
    pub phone_id: String,
    pub to: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search: SearchConfig {
                keywords: vec![
                    "IT Support".to_string(),
                    "1st Level Support".to_string(),
                    "Service Desk".to_string(),
                    "Workplace Support".to_string(),
                    "Onsite Support".to_string(),
                    "ICT Supporter".to_string(),
                    "Helpdesk".to_string(),
                ],
                title_variants_de: vec![
                    "ICT Supporter".to_string(),
                    "IT Supporter".to_string(),
                    "Benutzersupport".to_string(),
                    "Servicedesk".to_string(),
                    "Systemtechniker".to_string(),
                    "Rollout Techniker".to_string(),
                    "Junior Systemadministrator".to_string(),
                ],
                title_variants_en: vec![
                    "Service Desk".to_string(),
                    "Desktop Support".to_string(),
                    "Field Service".to_string(),
                    "Rollout Technician".to_string(),
                    "Junior System Administrator".to_string(),
                ],
                negative_keywords: vec![
                    "Senior".to_string(),
                    "Lead".to_string(),
                    "Manager".to_string(),
                    "Bachelor".to_string(),
                    "Master".to_string(),
                ],
                locations: vec![
                    "Buelach".to_string(),
                    "Kloten".to_string(),
                    "Zuerich".to_string(),
                ],
                limit_per_site: 25,
                max_total: 0,
                request_delay_ms: 500,
            },
            mail: MailConfig {
                min_score: 2,
                reminder_days: 2,
                close_missing_runs: 3,
                close_not_seen_days: 7,
                daily_reminders: false,
                aggregator_sources: vec![
                    "careerjet".to_string(),
                    "jobrapido".to_string(),
                    "jooble".to_string(),
                ],
            },
            paths: PathsConfig {
                state_file: PathBuf::from("generated/job_state.json"),
                seen_file: PathBuf::from("generated/seen_jobs.json"),
                tracker_file: PathBuf::from("generated/job_tracker.csv"),
                export_file: PathBuf::from("generated/jobs.json"),
                lock_file: PathBuf::from("generated/mail_list.lock"),
            },
            lock: LockConfig { ttl_min: 120 },
            whatsapp: WhatsAppConfig {
                enabled: false,
                token: String::new(),
                phone_id: String::new(),
                to: String::new(),
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &PathBuf) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&content).map_err(|e| {
                JobScoutError::Configuration(format!("Failed to parse config: {}", e))
            })?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    fn save_to(&self, config_path: &PathBuf) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| {
            JobScoutError::Configuration(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(config_path, content)?;
        Ok(())
    }

    fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("job-scout")
            .join("config.toml")
    }

    /// All positive scoring terms: keywords plus both variant lists.
    pub fn positive_terms(&self) -> Vec<String> {
        let mut terms = self.search.keywords.clone();
        terms.extend(self.search.title_variants_de.iter().cloned());
        terms.extend(self.search.title_variants_en.iter().cloned());
        terms
    }
}
