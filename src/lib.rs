//! callscribe - daily voice-ticket transcription and digest pipeline
//!
//! A batch pipeline that pulls the previous day's voice tickets from a
//! helpdesk, transcribes and summarizes their call recordings, writes
//! each summary back to its ticket as a private comment, and mails one
//! aggregated HTML digest.
//!
//! # Architecture
//!
//! The pipeline is a straight line per ticket:
//! - Locate voice tickets for the reporting window
//! - Resolve each ticket's first call recording and its parties
//! - Download, probe, transcribe, summarize
//! - Annotate the ticket and render the digest entry
//!
//! Stage failures are logged per ticket and never abort the run; only
//! startup problems (missing configuration, a held run lock) do.
//!
//! # Modules
//!
//! - `adapters`: External services (helpdesk, speech, mail)
//! - `audio`: Duration probing of downloaded recordings
//! - `core`: Pipeline, retry policy, run workspace, digest rendering
//! - `domain`: Data structures (TicketRecord, DayWindow, resolution)
//! - `config`: Settings resolution from env and config file
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Process yesterday's window and send the digest
//! callscribe run
//!
//! # Preview a three-day backfill without side effects
//! callscribe run --days 3 --dry-run
//!
//! # Count voice tickets updated over the last year
//! callscribe volume --days 365
//! ```

pub mod adapters;
pub mod audio;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use adapters::{HelpdeskClient, MailClient, PaginationPolicy, SpeechClient};
pub use config::Settings;
pub use core::{Pipeline, RetryPolicy, RunReport, RunWorkspace};
pub use domain::{
    CallDuration, DayWindow, ResolutionClassifier, ResolutionStatus, TicketRecord,
};
