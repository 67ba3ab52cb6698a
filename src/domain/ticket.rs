//! Ticket records accumulated over a pipeline run.

use serde::Serialize;
use std::fmt;

/// Company label used when the caller's employer could not be determined.
pub const UNKNOWN_COMPANY: &str = "Unknown";

/// Everything the pipeline learns about one voice ticket.
///
/// A record starts out with just the ticket id and fills in as each
/// stage completes. Stages that fail leave their fields at the empty
/// defaults, so the digest renders blanks rather than dropping rows.
#[derive(Debug, Clone, Serialize)]
pub struct TicketRecord {
    /// Helpdesk ticket id.
    pub id: u64,
    /// URL of the first call recording attached to the ticket, if any.
    pub recording_url: Option<String>,
    /// Caller name taken from the voice comment metadata.
    pub customer: String,
    /// Agent who answered the call.
    pub agent: String,
    /// Full transcript of the recording.
    pub transcript: String,
    /// Model-written summary of the call.
    pub summary: String,
    /// Whether the summary states the issue was resolved.
    pub resolved: bool,
    /// Recording length probed from the downloaded audio.
    pub duration: Option<CallDuration>,
    /// Company the caller works for. Empty until extraction runs;
    /// [`UNKNOWN_COMPANY`] when extraction ran but could not tell.
    pub company: String,
}

impl TicketRecord {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            recording_url: None,
            customer: String::new(),
            agent: String::new(),
            transcript: String::new(),
            summary: String::new(),
            resolved: false,
            duration: None,
            company: String::new(),
        }
    }

    /// True once summarization produced usable text.
    pub fn has_summary(&self) -> bool {
        !self.summary.trim().is_empty()
    }
}

/// Call length in whole minutes and leftover seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CallDuration {
    pub minutes: u64,
    pub seconds: u64,
}

impl CallDuration {
    pub fn from_seconds(total: u64) -> Self {
        Self {
            minutes: total / 60,
            seconds: total % 60,
        }
    }
}

impl fmt::Display for CallDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} min {} sec", self.minutes, self.seconds)
    }
}
