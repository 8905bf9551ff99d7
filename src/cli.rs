//! CLI interface for the job scout

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "job-scout")]
#[command(about = "Swiss job portal scraper with applicant state tracking")]
#[command(
    long_about = "Scrapes job portals, scores postings against a candidate profile, reconciles them against persisted state across runs and sends digest notifications"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scrape portals, reconcile state and send digests
    Run {
        /// Report what would be sent without sending or marking anything
        #[arg(long)]
        dry_run: bool,

        /// Send every open posting instead of new + reminders
        #[arg(long)]
        send_open: bool,
    },

    /// Tracker spreadsheet commands
    Tracker {
        #[command(subcommand)]
        action: TrackerAction,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
pub enum TrackerAction {
    /// Rewrite the tracker spreadsheet from the current state
    Export {
        /// Include closed postings
        #[arg(long)]
        include_closed: bool,
    },

    /// Apply manual tracker edits back onto the state store
    Sync,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Reset configuration to defaults
    Reset,
}
