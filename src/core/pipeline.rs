//! End-to-end pipeline for one run.
//!
//! Per window: locate voice tickets, resolve each ticket's first call
//! recording, download it, probe it, transcribe, summarize, and write
//! the summary back to the ticket. After all windows, one digest mail
//! covers every record. Stage failures mark the record in the run's
//! error log and move on; after startup the run itself never fails.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::adapters::helpdesk::{self, HelpdeskClient};
use crate::adapters::mail::MailClient;
use crate::adapters::speech::{ModelClassifier, SpeechClient, SpeechError};
use crate::audio;
use crate::config::Settings;
use crate::core::digest;
use crate::core::workspace::RunWorkspace;
use crate::domain::{
    DayWindow, PhraseClassifier, ResolutionClassifier, ResolutionStrategy, TicketRecord,
    UNKNOWN_COMPANY,
};

/// Counters and records from one run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,
    /// All discovered tickets, in digest order
    pub records: Vec<TicketRecord>,
    /// Tickets found by search
    pub discovered: usize,
    /// Tickets with a call recording
    pub with_recording: usize,
    /// Recordings transcribed
    pub transcribed: usize,
    /// Transcripts summarized
    pub summarized: usize,
    /// Tickets updated with a private comment
    pub annotated: usize,
    /// Tickets with a recording abandoned after a stage error
    pub skipped: usize,
    /// Whether the digest mail went out
    pub digest_sent: bool,
}

/// Wiring for pipeline runs.
pub struct Pipeline {
    settings: Settings,
    helpdesk: HelpdeskClient,
    speech: Arc<SpeechClient>,
    mail: MailClient,
    classifier: Box<dyn ResolutionClassifier>,
}

impl Pipeline {
    /// Build all clients from resolved settings.
    pub fn from_settings(settings: Settings) -> Self {
        let helpdesk = HelpdeskClient::from_settings(&settings.helpdesk);
        let speech = Arc::new(SpeechClient::from_settings(&settings.speech));
        let mail = MailClient::from_settings(&settings.mail);
        let classifier: Box<dyn ResolutionClassifier> = match settings.resolution {
            ResolutionStrategy::Phrase => Box::new(PhraseClassifier),
            ResolutionStrategy::Model => Box::new(ModelClassifier::new(Arc::clone(&speech))),
        };
        Self {
            settings,
            helpdesk,
            speech,
            mail,
            classifier,
        }
    }

    /// Locate tickets and resolve their call metadata without
    /// downloading, transcribing, or writing anything.
    pub async fn preview(&self, days: u32) -> Result<Vec<TicketRecord>> {
        if days == 0 {
            anyhow::bail!("days must be at least 1");
        }

        let mut records = Vec::new();
        for days_ago in (1..=days).rev() {
            let window = DayWindow::days_back(days_ago, self.settings.window_start_hour);
            records.extend(self.locate_tickets(&window, None).await?);
        }
        Ok(records)
    }

    /// Process the last `days` reporting windows and send the digest.
    pub async fn run(&self, days: u32, keep_audio: bool) -> Result<RunReport> {
        if days == 0 {
            anyhow::bail!("days must be at least 1");
        }

        let workspace = RunWorkspace::create(&self.settings.home)?;
        info!(run_id = %workspace.run_id, days, "Starting run");

        // Oldest window first so the digest reads chronologically.
        let mut records: Vec<TicketRecord> = Vec::new();
        for days_ago in (1..=days).rev() {
            let window = DayWindow::days_back(days_ago, self.settings.window_start_hour);
            match self.locate_tickets(&window, Some(&workspace)).await {
                Ok(found) => records.extend(found),
                Err(e) => {
                    warn!(error = %e, window_start = %window.start, "Search failed; skipping window");
                    workspace.log_error(
                        None,
                        &format!("search failed for window starting {}: {:#}", window.start, e),
                    );
                }
            }
        }

        let mut report = RunReport {
            run_id: workspace.run_id.clone(),
            records: Vec::new(),
            discovered: records.len(),
            with_recording: 0,
            transcribed: 0,
            summarized: 0,
            annotated: 0,
            skipped: 0,
            digest_sent: false,
        };

        // Recording files are numbered by discovery order over the
        // tickets that actually have one.
        let mut recording_index = 0usize;
        for record in records.iter_mut() {
            if record.recording_url.is_none() {
                continue;
            }
            report.with_recording += 1;
            recording_index += 1;
            self.process_recording(record, recording_index, &workspace, &mut report)
                .await;
        }

        digest::sort_for_digest(&mut records);
        let newest = DayWindow::days_back(1, self.settings.window_start_hour);
        let subject = digest::digest_subject(newest.start);
        let html = digest::render_digest(&records);
        report.digest_sent = match self
            .mail
            .send_html(&self.settings.mail.from, &self.settings.mail.to, &subject, &html)
            .await
        {
            Ok(()) => {
                info!(recipient = %self.settings.mail.to, "Digest sent");
                true
            }
            Err(e) => {
                warn!(error = %e, "Digest mail failed");
                workspace.log_error(None, &format!("digest mail failed: {:#}", e));
                false
            }
        };

        if keep_audio {
            info!(dir = %workspace.root.display(), "Keeping downloaded recordings");
        } else if let Err(e) = workspace.remove_recordings() {
            warn!(error = %e, "Failed to remove recordings");
            workspace.log_error(None, &format!("recording cleanup failed: {}", e));
        }

        report.records = records;
        Ok(report)
    }

    /// Search one window and resolve call metadata for each hit.
    async fn locate_tickets(
        &self,
        window: &DayWindow,
        workspace: Option<&RunWorkspace>,
    ) -> Result<Vec<TicketRecord>> {
        let query = helpdesk::created_in_window_query(window);
        let found = self
            .helpdesk
            .search_tickets(&query, "created_at", self.settings.pagination)
            .await?;
        info!(tickets = found.len(), window_start = %window.start, "Located voice tickets");

        let mut records = Vec::with_capacity(found.len());
        for ticket in found {
            let mut record = TicketRecord::new(ticket.id);
            match self.helpdesk.first_recording(ticket.id).await {
                Ok(Some(recording)) => {
                    record.customer = resolve_customer(
                        recording.from_name.as_deref(),
                        recording.to_name.as_deref(),
                        &self.settings.organization,
                    );
                    record.agent = recording.answered_by.clone().unwrap_or_default();
                    record.recording_url = Some(recording.recording_url);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        ticket = ticket.id,
                        error = %e,
                        "Comment lookup failed; treating ticket as having no recording"
                    );
                    if let Some(ws) = workspace {
                        ws.log_error(Some(ticket.id), &format!("comment lookup failed: {:#}", e));
                    }
                }
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Download, transcribe, summarize, and annotate one ticket.
    /// Each failure logs, marks the record, and ends its processing.
    async fn process_recording(
        &self,
        record: &mut TicketRecord,
        index: usize,
        workspace: &RunWorkspace,
        report: &mut RunReport,
    ) {
        let url = match &record.recording_url {
            Some(url) => url.clone(),
            None => return,
        };

        let audio_path = workspace.recording_path(index);
        if let Err(e) = self.helpdesk.download_recording(&url, &audio_path).await {
            warn!(ticket = record.id, error = %e, "Recording download failed");
            workspace.log_error(Some(record.id), &format!("download failed: {:#}", e));
            report.skipped += 1;
            return;
        }

        match audio::probe_duration(&audio_path) {
            Ok(duration) => record.duration = Some(duration),
            Err(e) => {
                warn!(ticket = record.id, error = %e, "Recording unusable; skipping transcription");
                workspace.log_error(Some(record.id), &format!("malformed audio: {:#}", e));
                report.skipped += 1;
                return;
            }
        }

        // Transcription gets no retry; a failure skips the ticket.
        let transcript = match self.speech.transcribe(&audio_path).await {
            Ok(text) => text,
            Err(e) => {
                warn!(ticket = record.id, error = %e, "Transcription failed");
                workspace.log_error(Some(record.id), &format!("transcription failed: {}", e));
                report.skipped += 1;
                return;
            }
        };
        report.transcribed += 1;

        let transcript_path = workspace.transcript_path(record.id);
        if let Err(e) = tokio::fs::write(&transcript_path, &transcript).await {
            warn!(ticket = record.id, error = %e, "Failed to persist transcript");
            workspace.log_error(Some(record.id), &format!("transcript write failed: {}", e));
        }
        record.transcript = transcript;

        let summary = match self
            .with_retry(record.id, "summarize", workspace, || {
                self.speech
                    .summarize(&record.customer, &record.agent, &record.transcript)
            })
            .await
        {
            Some(summary) => summary,
            None => {
                report.skipped += 1;
                return;
            }
        };
        record.summary = summary;
        report.summarized += 1;

        match self
            .with_retry(record.id, "company extraction", workspace, || {
                self.speech.extract_company(&record.transcript)
            })
            .await
        {
            Some(company) if !company.trim().is_empty() => {
                record.company = company.trim().to_string();
            }
            _ => record.company = UNKNOWN_COMPANY.to_string(),
        }

        match self.classifier.classify(&record.summary).await {
            Ok(status) => record.resolved = status.is_resolved(),
            Err(e) => {
                warn!(
                    ticket = record.id,
                    error = %e,
                    "Resolution classification failed; marking unresolved"
                );
                workspace.log_error(Some(record.id), &format!("classification failed: {}", e));
            }
        }

        if record.has_summary() {
            match self.annotate(record).await {
                Ok(()) => report.annotated += 1,
                Err(e) => {
                    warn!(ticket = record.id, error = %e, "Ticket update failed");
                    workspace.log_error(Some(record.id), &format!("ticket update failed: {:#}", e));
                }
            }
        }
    }

    /// Upload the transcript and attach it with the summary as a
    /// private comment. No retry on this write path.
    async fn annotate(&self, record: &TicketRecord) -> Result<()> {
        let token = self
            .helpdesk
            .upload_transcript(
                &format!("transcription_{}", record.id),
                record.transcript.clone(),
            )
            .await?;
        self.helpdesk
            .annotate_ticket(record.id, &record.summary, &token)
            .await
    }

    /// Run a model call under the retry policy. Transient failures
    /// back off and retry; terminal failures and exhausted policies
    /// log and yield None.
    async fn with_retry<F, Fut>(
        &self,
        ticket_id: u64,
        call: &str,
        workspace: &RunWorkspace,
        mut operation: F,
    ) -> Option<String>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<String, SpeechError>>,
    {
        let policy = &self.settings.retry;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match operation().await {
                Ok(output) => return Some(output),
                Err(e) => {
                    if e.is_transient() && policy.should_retry(attempt) {
                        let delay = policy.delay_for_attempt(attempt);
                        warn!(
                            ticket = ticket_id,
                            call,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Model call failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    warn!(ticket = ticket_id, call, attempt, error = %e, "Model call abandoned");
                    workspace.log_error(
                        Some(ticket_id),
                        &format!("{} failed after {} attempts: {}", call, attempt, e),
                    );
                    return None;
                }
            }
        }
    }
}

/// Pick the customer name from a voice comment's parties. Calls placed
/// through the account's own line carry the organization name as the
/// caller; the counterparty is the customer in that case.
fn resolve_customer(from: Option<&str>, to: Option<&str>, organization: &str) -> String {
    match from {
        Some(name) if !organization.is_empty() && name == organization => {
            to.unwrap_or_default().to_string()
        }
        Some(name) => name.to_string(),
        None => String::new(),
    }
}
