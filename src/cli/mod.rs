//! Command-line interface for callscribe.
//!
//! Provides commands for running the daily pipeline, previewing a
//! window without side effects, measuring call volume, and showing
//! the resolved configuration.

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::adapters::helpdesk::{self, HelpdeskClient};
use crate::config::Settings;
use crate::core::{Pipeline, RunReport};
use crate::domain::{DayWindow, TicketRecord};

/// callscribe - daily voice-ticket transcription and digest pipeline
#[derive(Parser, Debug)]
#[command(name = "callscribe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process recent reporting windows and send the digest
    Run {
        /// Number of day-long windows to process, ending yesterday
        #[arg(long, default_value = "1")]
        days: u32,

        /// Locate tickets and print them without downloading,
        /// transcribing, or writing anything
        #[arg(long)]
        dry_run: bool,

        /// Keep downloaded recordings instead of deleting them
        #[arg(long)]
        keep_audio: bool,
    },

    /// Count voice tickets updated per day over a period
    Volume {
        /// Number of days to look back
        #[arg(long, default_value = "365")]
        days: u32,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                days,
                dry_run,
                keep_audio,
            } => execute_run(days, dry_run, keep_audio).await,
            Commands::Volume { days } => execute_volume(days).await,
            Commands::Config => execute_config().await,
        }
    }
}

/// Run the pipeline, or preview it with --dry-run
async fn execute_run(days: u32, dry_run: bool, keep_audio: bool) -> Result<()> {
    let settings = Settings::load()?;
    let pipeline = Pipeline::from_settings(settings);

    if dry_run {
        let records = pipeline.preview(days).await?;
        print_preview(&records);
        return Ok(());
    }

    let report = pipeline.run(days, keep_audio).await?;
    print_report(&report);
    Ok(())
}

fn print_preview(records: &[TicketRecord]) {
    if records.is_empty() {
        println!("No voice tickets found");
        return;
    }

    println!(
        "{:<10} {:<10} {:<28} {:<20}",
        "TICKET", "RECORDING", "CUSTOMER", "AGENT"
    );
    println!("{}", "-".repeat(75));

    for record in records {
        let has_recording = if record.recording_url.is_some() {
            "yes"
        } else {
            "no"
        };
        println!(
            "{:<10} {:<10} {:<28} {:<20}",
            record.id, has_recording, record.customer, record.agent
        );
    }

    println!("\nTotal: {} tickets", records.len());
}

fn print_report(report: &RunReport) {
    println!();
    println!("{}", "═".repeat(62));
    println!("  Run Summary ({})", report.run_id);
    println!("{}", "═".repeat(62));
    println!();
    println!("  Tickets discovered:   {}", report.discovered);
    println!("  With recording:       {}", report.with_recording);
    println!("  Transcribed:          {}", report.transcribed);
    println!("  Summarized:           {}", report.summarized);
    println!("  Tickets updated:      {}", report.annotated);
    println!("  Skipped after errors: {}", report.skipped);
    println!(
        "  Digest sent:          {}",
        if report.digest_sent { "yes" } else { "no" }
    );
}

/// Count voice tickets updated per day over the last `days` days
async fn execute_volume(days: u32) -> Result<()> {
    if days == 0 {
        anyhow::bail!("days must be at least 1");
    }

    let settings = Settings::load()?;
    let helpdesk = HelpdeskClient::from_settings(&settings.helpdesk);

    let mut total = 0usize;
    for days_ago in (1..=days).rev() {
        let window = DayWindow::days_back(days_ago, settings.window_start_hour);
        let query = helpdesk::updated_in_window_query(&window);
        let tickets = helpdesk
            .search_tickets(&query, "updated_at", settings.pagination)
            .await?;
        total += tickets.len();
    }

    println!("Voice tickets updated over the last {} day(s): {}", days, total);
    println!("Average per day: {:.2}", total as f64 / days as f64);

    Ok(())
}

/// Show the resolved configuration (for debugging)
async fn execute_config() -> Result<()> {
    let settings = Settings::load()?;

    println!("{}", "═".repeat(62));
    println!("  callscribe configuration");
    println!("{}", "═".repeat(62));
    println!();
    println!(
        "Config file: {}",
        settings
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Helpdesk:");
    println!("  Base URL:  {}", settings.helpdesk.base_url);
    println!("  Account:   {}", settings.helpdesk.email);
    println!("  API token: {}", redact(&settings.helpdesk.api_token));
    println!();
    println!("Speech:");
    println!("  Base URL:      {}", settings.speech.base_url);
    println!("  API key:       {}", redact(&settings.speech.api_key));
    println!("  Transcription: {}", settings.speech.transcription_model);
    println!("  Completion:    {}", settings.speech.completion_model);
    println!();
    println!("Mail:");
    println!("  Tenant:        {}", settings.mail.tenant_id);
    println!("  Client id:     {}", settings.mail.client_id);
    println!("  Client secret: {}", redact(&settings.mail.client_secret));
    println!("  From:          {}", settings.mail.from);
    println!("  To:            {}", settings.mail.to);
    println!();
    println!("Pipeline:");
    println!(
        "  Organization:      {}",
        if settings.organization.is_empty() {
            "(not set)"
        } else {
            &settings.organization
        }
    );
    println!("  Window start hour: {:02}:00Z", settings.window_start_hour);
    println!(
        "  Retry:             {} attempts, {}s base backoff",
        settings.retry.max_attempts, settings.retry.backoff_base_secs
    );
    println!("  Pagination:        {:?}", settings.pagination);
    println!("  Resolution:        {:?}", settings.resolution);
    println!("  State directory:   {}", settings.home.display());

    Ok(())
}

/// Keep a short prefix of a secret for recognition, hide the rest.
fn redact(secret: &str) -> String {
    if secret.chars().count() <= 4 {
        return "***".to_string();
    }
    let prefix: String = secret.chars().take(4).collect();
    format!("{}***", prefix)
}
