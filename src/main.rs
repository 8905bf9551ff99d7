//! Job scout: Swiss job portal scraping and applicant state tracking

use clap::Parser;
use colored::Colorize;
use job_scout::cli::{Cli, Commands, ConfigAction, TrackerAction};
use job_scout::config::Config;
use job_scout::error::Result;
use job_scout::pipeline::runner::{self, RunOptions, RunStats};
use job_scout::state::clock::now_iso;
use job_scout::state::store::{load_state, save_state};
use job_scout::tracker::{apply_tracker_marks, load_tracker, write_tracker};
use log::error;
use std::process;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run_command(cli.command, config).await {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

async fn run_command(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Run { dry_run, send_open } => {
            let options = RunOptions { dry_run, send_open };

            println!("🔍 Scraping job portals...");
            let stats = runner::run(&config, &options).await?;
            print_stats(&stats, send_open);
        }

        Commands::Tracker { action } => match action {
            TrackerAction::Export { include_closed } => {
                let stamp = now_iso();
                let loaded = load_state(&config.paths.state_file, &config.paths.seen_file, &stamp);
                let existing = load_tracker(&config.paths.tracker_file);
                write_tracker(
                    &loaded.records,
                    &config.paths.tracker_file,
                    &existing,
                    include_closed,
                )?;
                println!(
                    "✅ Tracker written: {} ({} records)",
                    config.paths.tracker_file.display(),
                    loaded.records.len()
                );
            }

            TrackerAction::Sync => {
                let stamp = now_iso();
                let loaded = load_state(&config.paths.state_file, &config.paths.seen_file, &stamp);
                let migrated = loaded.migrated_from_seen();
                let mut state = loaded.records;

                let rows = load_tracker(&config.paths.tracker_file);
                let updates = apply_tracker_marks(&mut state, &rows, &stamp);
                if updates > 0 || migrated {
                    save_state(&state, &config.paths.state_file)?;
                }
                println!("✅ Applied {} manual tracker edits", updates);
            }
        },

        Commands::Config { action } => match action {
            Some(ConfigAction::Show) | None => {
                println!("⚙️  Current Configuration\n");
                println!("State file: {}", config.paths.state_file.display());
                println!("Tracker file: {}", config.paths.tracker_file.display());
                println!("Keywords: {}", config.search.keywords.join(", "));
                println!("Locations: {}", config.search.locations.join(", "));
                println!("\nMail settings:");
                println!("  Min score: {}", config.mail.min_score);
                println!("  Reminder days: {}", config.mail.reminder_days);
                println!("  Close after missing runs: {}", config.mail.close_missing_runs);
                println!("  Close after days unseen: {}", config.mail.close_not_seen_days);
                println!("  Daily reminders: {}", config.mail.daily_reminders);
            }

            Some(ConfigAction::Reset) => {
                let default_config = Config::default();
                default_config.save()?;
                println!("✅ Configuration reset to defaults");
            }
        },
    }

    Ok(())
}

fn print_stats(stats: &RunStats, send_open: bool) {
    println!("\n📊 Run statistics:");
    for (key, value) in stats.counter_lines() {
        println!("  {}: {}", key, value);
    }

    if stats.migrated_from_seen {
        println!("💡 Legacy seen-jobs file was migrated into the state store");
    }

    let dispatched = stats.mailed_new_count + stats.mailed_reminder_count;
    if stats.dry_run && dispatched > 0 {
        let message = if send_open {
            format!("[DRY RUN] Would have sent {} open jobs", stats.mailed_new_count)
        } else {
            format!(
                "[DRY RUN] Would have sent {} new, {} reminders",
                stats.mailed_new_count, stats.mailed_reminder_count
            )
        };
        println!("{}", message.yellow());
    } else if stats.mail_sent {
        let message = if send_open {
            format!("Digest sent ({} open jobs)", stats.mailed_new_count)
        } else {
            format!(
                "Digest sent ({} new, {} reminders)",
                stats.mailed_new_count, stats.mailed_reminder_count
            )
        };
        println!("{}", message.green());
    } else {
        println!("No new or open jobs to send.");
    }
}
